mod helpers;
mod money;

pub use helpers::parse_boolean_flag;
pub use money::{Money, MoneyConversionError};
