pub mod data;

pub use data::{Association, ConditionParams, Record};
