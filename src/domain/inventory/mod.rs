mod stock_ledger;

pub use stock_ledger::{StockApplied, StockDelta, StockError, StockLedger, StockMutation};
