//! # nfv9-export
//!
//! NetFlow v9 exporter core.
//!
//! Turns flow records with a variable set of extensions into NetFlow v9
//! packets for one collector. Each distinct extension combination gets its
//! own template; templates are emitted before their first data flowset in
//! a packet and re-announced periodically.
//!
//! ## Architecture
//!
//! - **Schema** ([`schema`]): extension ids and their ordered field lists
//! - **Templates** ([`template`]): template layout, flowset encoding, cache
//! - **Session** ([`session`]): packet assembly into an [`ExportBuffer`]
//! - **Transport** ([`transport`]): sending finished packets over UDP
//!
//! ## Example
//!
//! ```
//! use nfv9_export::{AddOutcome, ExportSession, ExtensionId, FlowRecord};
//!
//! let mut session = ExportSession::builder().max_packet_size(1472).build();
//! let mut buffer = session.new_buffer();
//!
//! let record = FlowRecord::new(vec![ExtensionId::GenericFlow, ExtensionId::Ipv6Flow]);
//! loop {
//!     match session.add_record(&record, &mut buffer).unwrap() {
//!         AddOutcome::FlushRequired => {
//!             let _packet = buffer.take(); // send it
//!         }
//!         _ => break,
//!     }
//! }
//! session.close_packet(&mut buffer).unwrap();
//! assert!(buffer.flush_requested());
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod protocol;
pub mod record;
pub mod schema;
pub mod session;
pub mod template;
pub mod transport;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::ExportConfig;
pub use error::{ExportError, Result};
pub use protocol::ExportBuffer;
pub use record::FlowRecord;
pub use schema::ExtensionId;
pub use session::{AddOutcome, CloseOutcome, ExportSession, SessionBuilder};
