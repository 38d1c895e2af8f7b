pub use crate::config::MasterConfig;
pub use crate::element::{
    CleanupStage, ConfigArgs, Discipline, Element, ElementRegistry, Processing,
};
pub use crate::error::{RouterError, TopologyError};
pub use crate::handler::{Handler, HandlerCtx, HandlerSet, downcast_mut, downcast_ref};
pub use crate::master::Master;
pub use crate::notifier::NotifierSignal;
pub use crate::packet::Packet;
pub use crate::router::{ElementCtx, InitializeCtx, Router, STOP_RUNCOUNT, install_config};
pub use crate::task::Task;
pub use crate::timer::Timer;
