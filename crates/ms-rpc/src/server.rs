use std::io;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::codec;
use crate::error::RpcError;
use crate::wire::{Request, Response};

/// Période de scrutation de l'accept non bloquant. stop() est donc
/// observé en bien moins d'une seconde.
const ACCEPT_POLL: Duration = Duration::from_millis(50);

/// L'objet auquel le dispatch du serveur route les appels entrants.
pub trait Handler: Send + Sync + 'static {
    /// Traite une requête et produit sa réponse. Peut bloquer — le
    /// serveur consacre un thread à chaque connexion entrante.
    fn handle(&self, request: Request) -> Response;
}

/// Serveur TCP : un thread d'accept nommé, un thread de dispatch par
/// connexion entrante.
pub struct RpcServer {
    name: String,
    local_address: SocketAddr,
    shutdown: Arc<AtomicBool>,
    accept_handle: Option<JoinHandle<()>>,
    connections: Arc<Mutex<Vec<TcpStream>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl RpcServer {
    /// Lie `address` et démarre la boucle d'accept. `address` peut
    /// porter le port 0 — l'adresse réellement liée se lit ensuite
    /// sur [`RpcServer::local_address`].
    ///
    /// # Errors
    /// [`RpcError::Unavailable`] si l'adresse ne peut être liée.
    pub fn run<H: Handler>(handler: Arc<H>, address: &str, name: &str) -> Result<Self, RpcError> {
        let unavailable = |source: io::Error| RpcError::Unavailable {
            address: address.to_string(),
            source,
        };
        let listener = TcpListener::bind(address).map_err(unavailable)?;
        listener.set_nonblocking(true).map_err(unavailable)?;
        let local_address = listener.local_addr().map_err(unavailable)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let connections = Arc::new(Mutex::new(Vec::new()));

        let loop_shutdown = Arc::clone(&shutdown);
        let loop_connections = Arc::clone(&connections);
        let loop_name = name.to_string();
        let accept_handle = thread::Builder::new()
            .name(format!("{name}-accept"))
            .spawn(move || {
                accept_loop(&handler, &listener, &loop_shutdown, &loop_connections, &loop_name);
            })
            .map_err(unavailable)?;

        log::info!("[{name}] serveur à l'écoute sur {local_address}");
        Ok(Self {
            name: name.to_string(),
            local_address,
            shutdown,
            accept_handle: Some(accept_handle),
            connections,
        })
    }

    /// Adresse réellement liée (utile après un port 0).
    #[must_use]
    pub fn local_address(&self) -> SocketAddr {
        self.local_address
    }

    /// Arrête d'accepter, ferme les connexions actives, et rend la
    /// main une fois la boucle d'accept terminée. Idempotent.
    pub fn stop(&mut self) {
        if !self.shutdown.swap(true, Ordering::Relaxed) {
            for stream in lock(&self.connections).drain(..) {
                let _ = stream.shutdown(Shutdown::Both);
            }
            log::info!("[{}] arrêt du serveur {}", self.name, self.local_address);
        }
        if let Some(handle) = self.accept_handle.take()
            && handle.join().is_err()
        {
            log::warn!("[{}] la boucle d'accept a paniqué", self.name);
        }
    }
}

impl Drop for RpcServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn accept_loop<H: Handler>(
    handler: &Arc<H>,
    listener: &TcpListener,
    shutdown: &AtomicBool,
    connections: &Mutex<Vec<TcpStream>>,
    name: &str,
) {
    while !shutdown.load(Ordering::Relaxed) {
        match listener.accept() {
            Ok((stream, peer)) => {
                log::debug!("[{name}] connexion entrante de {peer}");
                if stream.set_nonblocking(false).is_err() {
                    continue;
                }
                if let Ok(clone) = stream.try_clone() {
                    lock(connections).push(clone);
                }
                let conn_handler = Arc::clone(handler);
                let conn_name = name.to_string();
                let spawned = thread::Builder::new()
                    .name(format!("{name}-conn"))
                    .spawn(move || serve_connection(conn_handler.as_ref(), stream, peer, &conn_name));
                if let Err(e) = spawned {
                    log::warn!("[{name}] impossible de servir {peer}: {e}");
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL),
            Err(e) => {
                log::warn!("[{name}] accept: {e}");
                thread::sleep(ACCEPT_POLL);
            }
        }
    }
}

fn serve_connection<H: Handler>(handler: &H, mut stream: TcpStream, peer: SocketAddr, name: &str) {
    loop {
        let request: Request = match codec::read_message(&mut stream) {
            Ok(request) => request,
            Err(e) => {
                // EOF = le pair a raccroché, tout le reste se note.
                if e.kind() != io::ErrorKind::UnexpectedEof {
                    log::debug!("[{name}] lecture depuis {peer}: {e}");
                }
                break;
            }
        };
        let response = handler.handle(request);
        if let Err(e) = codec::write_message(&mut stream, &response) {
            log::debug!("[{name}] écriture vers {peer}: {e}");
            break;
        }
    }
    log::debug!("[{name}] connexion {peer} fermée");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::RpcClient;
    use crate::wire::CallError;
    use std::time::Instant;

    /// Répondeur de test : vivant, et la file toujours vide.
    struct Drained;

    impl Handler for Drained {
        fn handle(&self, request: Request) -> Response {
            match request {
                Request::RollCall => Response::Present(true),
                Request::GetTask(_) => Response::Failed(CallError::QueueDrained),
                _ => Response::Failed(CallError::UnsupportedMethod),
            }
        }
    }

    #[allow(clippy::unwrap_used)]
    fn start() -> RpcServer {
        RpcServer::run(Arc::new(Drained), "127.0.0.1:0", "test").unwrap()
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn calls_round_trip_over_localhost() {
        let server = start();
        let client = RpcClient::new(server.local_address().to_string(), "test-client");
        client.connect().unwrap();

        let response = client.call(&Request::RollCall).unwrap();
        assert!(matches!(response, Response::Present(true)));

        let response = client.call(&Request::GetTask("w".into())).unwrap();
        assert!(matches!(
            response,
            Response::Failed(CallError::QueueDrained)
        ));

        client.disconnect();
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn stop_interrupts_the_accept_wait_quickly() {
        let mut server = start();
        let started = Instant::now();
        server.stop();
        assert!(
            started.elapsed() < Duration::from_secs(1),
            "stop() must interrupt the accept wait within a bounded interval"
        );
        // Un second stop est un no-op.
        server.stop();
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn stop_closes_active_connections() {
        let mut server = start();
        let client = RpcClient::new(server.local_address().to_string(), "test-client");
        client.connect().unwrap();
        assert!(matches!(
            client.call(&Request::RollCall).unwrap(),
            Response::Present(true)
        ));

        server.stop();
        assert!(client.call(&Request::RollCall).is_err());
    }

    #[test]
    fn calling_without_a_connection_fails() {
        let client = RpcClient::new("127.0.0.1:1", "test-client");
        assert!(matches!(
            client.call(&Request::RollCall),
            Err(RpcError::NotConnected(_))
        ));
        // Déconnexion idempotente, même jamais connecté.
        client.disconnect();
        client.disconnect();
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn two_clients_are_served_concurrently() {
        let server = start();
        let address = server.local_address().to_string();
        let first = RpcClient::new(address.clone(), "first");
        let second = RpcClient::new(address, "second");
        first.connect().unwrap();
        second.connect().unwrap();
        assert!(matches!(
            first.call(&Request::RollCall).unwrap(),
            Response::Present(true)
        ));
        assert!(matches!(
            second.call(&Request::RollCall).unwrap(),
            Response::Present(true)
        ));
        first.disconnect();
        second.disconnect();
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn connect_to_a_dead_peer_is_unavailable() {
        // Un port qui vient d'être libéré : connexion refusée.
        let address = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().to_string()
        };
        let client = RpcClient::new(address, "test-client");
        let result = client.connect();
        assert!(matches!(result, Err(RpcError::Unavailable { .. })));
    }
}
