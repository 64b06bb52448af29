pub mod conditions;
pub mod postprocess;
pub mod resolver;

pub use crate::domain::model::{Direction, Fields, Model, Order, QuerySpec, Record, ResultRow};
pub use crate::domain::ports::DataSource;
pub use crate::domain::schema::{FieldKind, FieldSpec, KeyRole, PresentationSchema};
pub use crate::utils::error::Result;
pub use conditions::{Condition, Operator};
pub use resolver::Page;
