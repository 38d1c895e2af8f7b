use std::{error::Error, fmt};

/// Fatal installation and control-plane errors of the router core.
///
/// Packet-plane problems (a dropped packet) are never errors; elements count
/// them locally. Everything here is surfaced at a lifecycle boundary or
/// returned to the handler caller.
#[derive(Debug)]
pub enum RouterError {
    /// An element rejected its configuration string.
    ConfigSemantics { element: String, message: String },
    /// Port counts, discipline mismatch, or a dangling port.
    Topology(TopologyError),
    /// An element's `initialize` failed after configuration succeeded.
    Initialize { element: String, message: String },
    /// No handler with the given full name.
    HandlerNotFound { full_name: String },
    /// A read was asked of a write-only handler, or vice versa.
    HandlerKindMismatch { full_name: String, wanted_read: bool },
    /// A write hook rejected its value.
    HandlerWrite { full_name: String, message: String },
    /// A hot-swap configuration failed to install; the old router is intact.
    HotswapRejected(String),
}

impl fmt::Display for RouterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouterError::ConfigSemantics { element, message } => {
                if element.is_empty() {
                    write!(f, "{message}")
                } else {
                    write!(f, "{element}: {message}")
                }
            }
            RouterError::Topology(e) => write!(f, "{e}"),
            RouterError::Initialize { element, message } => {
                write!(f, "{element}: initialize failed: {message}")
            }
            RouterError::HandlerNotFound { full_name } => {
                write!(f, "no '{full_name}' handler")
            }
            RouterError::HandlerKindMismatch { full_name, wanted_read } => {
                if *wanted_read {
                    write!(f, "'{full_name}' is a write handler")
                } else {
                    write!(f, "'{full_name}' is a read handler")
                }
            }
            RouterError::HandlerWrite { full_name, message } => {
                write!(f, "'{full_name}': {message}")
            }
            RouterError::HotswapRejected(msg) => write!(f, "hot-swap rejected: {msg}"),
        }
    }
}

impl Error for RouterError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            RouterError::Topology(e) => Some(e),
            _ => None,
        }
    }
}

/// Graph-shape errors found while resolving port disciplines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopologyError {
    /// A connection references a port index beyond the element's declared count.
    BadPort { conn: String, element: String },
    /// The two endpoints declared push vs pull.
    DisciplineMismatch { conn: String },
    /// Both endpoints are agnostic; neither side decides.
    Ambiguous { conn: String },
    /// An agnostic port would need two different disciplines at once.
    MixedPeers { element: String, port: String },
    /// A pull output fans out to an input that is not pull.
    PullFanout { conn: String },
    /// A declared port has no connection at all.
    Dangling { element: String, port: String },
}

impl fmt::Display for TopologyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TopologyError::BadPort { conn, element } => {
                write!(f, "connection '{conn}': no such port on '{element}'")
            }
            TopologyError::DisciplineMismatch { conn } => {
                write!(f, "connection '{conn}': push output connected to pull input")
            }
            TopologyError::Ambiguous { conn } => {
                write!(f, "connection '{conn}': both endpoints agnostic")
            }
            TopologyError::MixedPeers { element, port } => {
                write!(f, "'{element}' {port}: peers demand conflicting disciplines")
            }
            TopologyError::PullFanout { conn } => {
                write!(f, "connection '{conn}': pull output fans out to a non-pull input")
            }
            TopologyError::Dangling { element, port } => {
                write!(f, "'{element}' {port}: not connected")
            }
        }
    }
}

impl Error for TopologyError {}
