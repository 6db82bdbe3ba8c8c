mod pool;

pub use pool::ThreadPool;

pub use num_cpus::get as num_cpus;
