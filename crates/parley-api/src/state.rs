use std::sync::Arc;

use parley_db::Database;
use parley_gateway::auth::TokenValidator;

use crate::dispatch::MessageDispatcher;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub dispatcher: MessageDispatcher,
    pub validator: TokenValidator,
}
