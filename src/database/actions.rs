pub mod memberships;
pub mod recipes;
pub mod reference;
pub mod shopping;
pub mod subscriptions;
pub mod users;

pub use memberships::toggle_membership;
pub use recipes::submit_recipe;
pub use shopping::shopping_list_for;
