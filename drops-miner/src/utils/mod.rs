pub mod expiring_set;

pub use expiring_set::ExpiringSet;
