//! Name server: the catalog-owning router that authorizes commands,
//! answers catalog-only queries directly, redirects data-plane verbs to
//! the owning storage server, and brokers NS-mediated verbs through the
//! [`transaction`] helper (§4.1).

pub mod session;
pub mod transaction;

use std::sync::Arc;

use tokio::net::TcpListener;

use crate::catalog::CatalogService;

pub async fn serve(listener: TcpListener, catalog: Arc<CatalogService>) -> std::io::Result<()> {
    loop {
        let (socket, peer) = listener.accept().await?;
        socket.set_nodelay(true)?;
        let catalog = Arc::clone(&catalog);
        tokio::spawn(async move {
            if let Err(e) = session::handle_connection(socket, catalog, peer).await {
                tracing::warn!(%peer, error = %e, "name server connection ended with an error");
            }
        });
    }
}
