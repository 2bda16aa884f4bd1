pub mod price_table;

pub use price_table::PriceTable;
