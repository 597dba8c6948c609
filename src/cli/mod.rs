pub mod portfolio;
pub mod rates;
pub mod setup;
pub mod ui;
