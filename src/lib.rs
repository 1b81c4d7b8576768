pub mod data_processing;
pub mod errors;
pub mod gapminder;
