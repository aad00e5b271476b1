//! In-memory links for wiring routers together inside one process.

use ipcr_router::Router;

use crate::error::InterfaceError;
use crate::stream::{Link, LinkOptions, attach};

const DUPLEX_BUFFER: usize = 64 * 1024;

/// Join two routers with a `tokio::io::duplex` pipe.
///
/// `a_opts` describes how `a` registers its peer (segment, known id), and
/// `b_opts` likewise for `b`.
pub async fn duplex_pair(
    a: &Router,
    a_opts: LinkOptions,
    b: &Router,
    b_opts: LinkOptions,
) -> Result<(Link, Link), InterfaceError> {
    let (a_side, b_side) = tokio::io::duplex(DUPLEX_BUFFER);
    let a_link = attach(a, a_side, a_opts).await?;
    let b_link = match attach(b, b_side, b_opts).await {
        Ok(link) => link,
        Err(e) => {
            a_link.stop().await;
            return Err(e);
        }
    };
    Ok((a_link, b_link))
}
