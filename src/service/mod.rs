// 8.0: intake service. build, place and cancel orders, answer order and margin
// account queries, forward collateral moves. every piece of state lives in the
// injected collaborators, so one service value can serve any number of tasks.

mod core;
mod margin;
mod orders;
mod results;

pub use self::core::{Collaborators, ExchangeService};
pub use results::{BuildOrderResult, OrdersPage, ServiceError};
