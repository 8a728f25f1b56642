pub mod dense;
pub mod initialization;
pub mod parameter;

pub use dense::{DenseLayer, DenseTrace};
pub use initialization::WeightInit;
pub use parameter::{ParamId, ParamMut, Parameter, Parameterized};
