//! Server network layer: TCP accept loop and broadcaster lifecycle

use crate::broadcaster::Broadcaster;
use crate::lobby::Lobby;
use crate::session::handle_connection;
use log::{error, info};
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, ToSocketAddrs};

/// Lobby server owning the listener and the shared lobby state
pub struct Server {
    listener: TcpListener,
    lobby: Lobby,
    tick_interval: Duration,
}

impl Server {
    pub async fn bind<A: ToSocketAddrs>(addr: A, tick_interval: Duration) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!("Server listening on {}", listener.local_addr()?);

        Ok(Server {
            listener,
            lobby: Lobby::new(),
            tick_interval,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Handle to the shared state, for inspection while the server runs
    pub fn lobby(&self) -> Lobby {
        self.lobby.clone()
    }

    /// Serves until the task is cancelled
    pub async fn run(self) -> std::io::Result<()> {
        self.run_until(std::future::pending::<()>()).await
    }

    /// Serves until `shutdown` resolves, then stops broadcasting and closes
    /// every connection
    pub async fn run_until<F: Future<Output = ()>>(self, shutdown: F) -> std::io::Result<()> {
        let broadcaster = Broadcaster::new(self.lobby.clone(), self.tick_interval).spawn();

        info!("Server started successfully");

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => {
                            tokio::spawn(handle_connection(stream, addr, self.lobby.clone()));
                        }
                        Err(e) => {
                            error!("Error accepting connection: {}", e);
                            tokio::time::sleep(Duration::from_millis(10)).await;
                        }
                    }
                }
                _ = &mut shutdown => {
                    info!("Server shutting down");
                    break;
                }
            }
        }

        broadcaster.stop().await;
        self.lobby.disconnect_all().await;

        Ok(())
    }
}
