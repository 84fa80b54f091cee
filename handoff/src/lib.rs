pub mod queue;

pub use self::queue::BlockingQueue;
