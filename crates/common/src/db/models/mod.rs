//! SeaORM entity models

mod query;

pub use query::{
    ActiveModel as QueryActiveModel, Column as QueryColumn, Entity as QueryEntity,
    Model as QueryRecord,
};
