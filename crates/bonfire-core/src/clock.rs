use chrono::{DateTime, Local};

/// Source of "now" for range evaluation and follow windows.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

/// The local wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> DateTime<Local> {
        (**self).now()
    }
}
