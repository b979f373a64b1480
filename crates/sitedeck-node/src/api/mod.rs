pub mod health;
pub mod sites;
pub mod stacks;
