// settlement/server/src/web/handlers/mod.rs

pub mod checkout_handlers;
pub mod delivery_handlers;
pub mod order_handlers;
pub mod webhook_handlers;
