//! Plain data: identifiers, amounts and the entities that make up a run.

pub mod aggregate;
pub mod amount;
pub mod bid;
pub mod ids;
pub mod participation;
pub mod run;
pub mod shopping_item;

pub use aggregate::*;
pub use amount::*;
pub use bid::*;
pub use ids::*;
pub use participation::*;
pub use run::*;
pub use shopping_item::*;
