pub mod conv;
pub mod dense;
pub mod initialization;

pub use conv::{Conv2DGradients, Conv2DLayer};
pub use dense::{DenseGradients, DenseLayer};
pub use initialization::WeightInit;
