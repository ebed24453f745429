mod error;
mod store;

pub use error::{PgDaoError, PgResult};
pub use store::PostgresAnswerStore;
