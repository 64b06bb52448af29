// Domain layer: models, the presentation schema and the data source port.

pub mod model;
pub mod ports;
pub mod schema;

pub use model::{Direction, Fields, Model, Order, QuerySpec, Record, ResultRow};
pub use ports::DataSource;
pub use schema::{FieldKind, FieldSpec, KeyRole, PresentationSchema};
