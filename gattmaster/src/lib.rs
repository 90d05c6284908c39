//! gattmaster - interactive BLE master
//!
//! Impersonates the master of a BLE peripheral and replays the commands of a
//! pipe separated table (see [`gattmaster_proto::compile`]) on request.
//!
//! ```ignore
//! let compiled = gattmaster::load_table("lock-commands.txt".as_ref()).await?;
//! let mut transport = BleTransport::find(BleOptions::new("ecfe7e123456")).await?;
//! transport.connect().await?;
//!
//! let console = Console::new(tokio::io::BufReader::new(tokio::io::stdin()), std::io::stdout());
//! let (end, _, _) = Session::new(transport, console)
//!     .with_table(Some(compiled.table))
//!     .run()
//!     .await?;
//! ```

mod console;
mod executor;
mod listener;
#[cfg(test)]
mod mock;
mod services;
mod session;
mod validate;

pub use console::Console;
pub use executor::{ActionError, ActionParams, Executor, Outcome};
pub use listener::{DEFAULT_LISTEN_WINDOW, ListenState, ListenSummary, NotificationListener};
pub use services::{CharacteristicRecord, ServiceRecord, ServicesDump, ServicesError};
pub use session::{Session, SessionEnd};
pub use validate::{Validation, validate};

use std::path::Path;

use gattmaster_proto::{Compiled, TableCompiler};
use tokio::io::AsyncReadExt;

const CHUNK: usize = 4096;

/// Compile a commands file, reading it chunk by chunk
pub async fn load_table(path: &Path) -> std::io::Result<Compiled> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut compiler = TableCompiler::new();
    let mut buf = vec![0u8; CHUNK];

    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        compiler.feed(&buf[..n]);
    }

    Ok(compiler.finish())
}
