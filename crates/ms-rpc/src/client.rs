use std::net::{Shutdown, TcpStream};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::codec;
use crate::error::RpcError;
use crate::wire::{Request, Response};

/// Poignée client : une connexion TCP vers un pair, un appel à la
/// fois.
///
/// La poignée se clone à bas coût (le flux est partagé) pour que le
/// ticker d'appel nominal du coordinateur puisse sonder un worker
/// sans tenir le verrou de comptabilité. Les appels concurrents sur
/// la même poignée se sérialisent sur le flux.
#[derive(Clone)]
pub struct RpcClient {
    address: String,
    name: String,
    stream: Arc<Mutex<Option<TcpStream>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl RpcClient {
    /// Crée une poignée non connectée vers `address`.
    #[must_use]
    pub fn new(address: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: name.into(),
            stream: Arc::new(Mutex::new(None)),
        }
    }

    /// Adresse du pair visé.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Ouvre la connexion. Un appel sur une poignée déjà connectée
    /// est un no-op journalisé.
    ///
    /// # Errors
    /// [`RpcError::Unavailable`] si le pair est injoignable.
    pub fn connect(&self) -> Result<(), RpcError> {
        let mut guard = lock(&self.stream);
        if guard.is_some() {
            log::warn!("[{}] déjà connecté à {}", self.name, self.address);
            return Ok(());
        }
        let stream = TcpStream::connect(&self.address).map_err(|source| RpcError::Unavailable {
            address: self.address.clone(),
            source,
        })?;
        // Les messages sont petits et synchrones : Nagle n'aide pas.
        let _ = stream.set_nodelay(true);
        *guard = Some(stream);
        log::info!("[{}] connecté à {}", self.name, self.address);
        Ok(())
    }

    /// Borne la durée d'attente d'une réponse. `None` (le défaut)
    /// attend indéfiniment — requis pour GetTask, qui suspend
    /// l'appelant tant que la file est vide.
    pub fn set_reply_timeout(&self, timeout: Option<Duration>) {
        if let Some(stream) = lock(&self.stream).as_ref() {
            let _ = stream.set_read_timeout(timeout);
        }
    }

    /// Invoque une méthode et attend sa réponse.
    ///
    /// # Errors
    /// [`RpcError::NotConnected`] sans connexion ouverte,
    /// [`RpcError::Call`] sur échec de transport. Un refus signalé
    /// par le pair arrive comme [`Response::Failed`], pas en `Err`.
    pub fn call(&self, request: &Request) -> Result<Response, RpcError> {
        let mut guard = lock(&self.stream);
        let Some(stream) = guard.as_mut() else {
            return Err(RpcError::NotConnected(self.address.clone()));
        };
        log::debug!(
            "[{}] appel {} vers {}",
            self.name,
            request.method_name(),
            self.address
        );
        codec::write_message(stream, request).map_err(|source| RpcError::Call {
            address: self.address.clone(),
            source,
        })?;
        codec::read_message(stream).map_err(|source| RpcError::Call {
            address: self.address.clone(),
            source,
        })
    }

    /// Ferme la connexion. Idempotent : refermer une poignée déjà
    /// fermée ne fait rien, y compris sous fermetures concurrentes.
    pub fn disconnect(&self) {
        if let Some(stream) = lock(&self.stream).take() {
            let _ = stream.shutdown(Shutdown::Both);
            log::info!("[{}] déconnecté de {}", self.name, self.address);
        }
    }

    /// True tant qu'une connexion est ouverte.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        lock(&self.stream).is_some()
    }
}
