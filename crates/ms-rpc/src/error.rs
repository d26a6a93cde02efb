use std::io;

use thiserror::Error;

use crate::wire::CallError;

/// Échecs côté appelant du transport.
///
/// Les erreurs de transport sont fatales pour un worker ; pour le
/// coordinateur un échec vers un worker déclenche la réclamation de
/// ses tâches, jamais l'arrêt du run.
#[derive(Error, Debug)]
pub enum RpcError {
    /// No active connection to the peer.
    #[error("pas de connexion active vers {0}")]
    NotConnected(String),

    /// The peer could not be reached at connect time.
    #[error("connexion à {address} impossible")]
    Unavailable {
        /// Peer address.
        address: String,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },

    /// A method invocation failed in transit.
    #[error("échec d'appel vers {address}")]
    Call {
        /// Peer address.
        address: String,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },

    /// The peer answered, refusing the call.
    #[error(transparent)]
    Refused(#[from] CallError),
}

impl RpcError {
    /// True pour la sentinelle de fin de flux — la sortie normale de
    /// la boucle d'un worker, pas une panne.
    #[must_use]
    pub fn is_queue_drained(&self) -> bool {
        matches!(self, RpcError::Refused(CallError::QueueDrained))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_the_sentinel_is_queue_drained() {
        assert!(RpcError::from(CallError::QueueDrained).is_queue_drained());
        assert!(!RpcError::from(CallError::UnsupportedMethod).is_queue_drained());
        assert!(!RpcError::NotConnected("x".into()).is_queue_drained());
    }
}
