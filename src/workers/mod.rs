pub mod callback_dispatcher;
pub mod delivery_pool;
