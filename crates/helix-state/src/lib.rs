pub mod error;
pub mod executor;
pub mod finalizer;
pub mod query;
pub mod replay;
pub mod store;

pub use error::StoreError;
pub use executor::{SimpleStateExecutor, StateExecutor};
pub use finalizer::Finaliser;
pub use query::{period_may_contain, periods_matching_bloom};
pub use store::{NonceRecord, PeriodData, Store, WriteBatch};
