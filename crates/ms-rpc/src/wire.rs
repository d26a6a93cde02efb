use serde::{Deserialize, Serialize};
use thiserror::Error;

use ms_core::settings::RenderSettings;
use ms_core::task::Task;

/// Un appel de méthode nommée. Les variantes couvrent les deux pairs :
/// un worker n'implémente que `RollCall`, le coordinateur tout le
/// reste.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Request {
    /// Coordinator.RegisterWorker — l'adresse du serveur du worker.
    RegisterWorker(String),
    /// Coordinator.DeRegisterWorker — même adresse, au départ.
    DeRegisterWorker(String),
    /// Sonde de vivacité, dans les deux sens.
    RollCall,
    /// Coordinator.GetTask — l'adresse du worker demandeur.
    GetTask(String),
    /// Coordinator.ReturnTask — la tâche et ses résultats.
    ReturnTask(Task),
    /// Coordinator.GetMandelbrotSettings.
    GetRenderSettings,
}

impl Request {
    /// Nom de méthode pour les journaux.
    #[must_use]
    pub fn method_name(&self) -> &'static str {
        match self {
            Request::RegisterWorker(_) => "RegisterWorker",
            Request::DeRegisterWorker(_) => "DeRegisterWorker",
            Request::RollCall => "RollCall",
            Request::GetTask(_) => "GetTask",
            Request::ReturnTask(_) => "ReturnTask",
            Request::GetRenderSettings => "GetRenderSettings",
        }
    }
}

/// La réponse d'un appel.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Response {
    /// Méthode sans valeur de retour.
    Ack,
    /// Réponse d'une sonde de vivacité.
    Present(bool),
    /// Une tâche à calculer.
    Assigned(Task),
    /// La copie des paramètres de rendu.
    Settings(RenderSettings),
    /// Échec signalé par le pair.
    Failed(CallError),
}

impl Response {
    /// Sépare les réponses utiles des échecs signalés par le pair.
    ///
    /// # Errors
    /// Retourne la [`CallError`] portée par une réponse `Failed`.
    pub fn into_result(self) -> Result<Response, CallError> {
        match self {
            Response::Failed(error) => Err(error),
            other => Ok(other),
        }
    }
}

/// Échec renvoyé par le pair, transporté sur le fil.
///
/// `QueueDrained` est la sentinelle réservée du coordinateur : elle
/// marque la fin du flux de tâches, pas une panne.
#[derive(Clone, Debug, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum CallError {
    /// End-of-stream sentinel for GetTask.
    #[error("all tasks handed out")]
    QueueDrained,
    /// The caller never registered (or was already deregistered).
    #[error("worker inconnu : {0}")]
    UnknownWorker(String),
    /// The peer does not serve this method.
    #[error("méthode non servie par ce pair")]
    UnsupportedMethod,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_keeps_its_reserved_wording() {
        assert_eq!(CallError::QueueDrained.to_string(), "all tasks handed out");
    }

    #[test]
    fn into_result_splits_failures() {
        assert!(Response::Ack.into_result().is_ok());
        let failed = Response::Failed(CallError::QueueDrained).into_result();
        assert!(matches!(failed, Err(CallError::QueueDrained)));
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn requests_survive_the_wire_format() {
        let request = Request::GetTask("127.0.0.1:4000".to_string());
        let bytes = bincode::serialize(&request).unwrap();
        let back: Request = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back.method_name(), "GetTask");
    }
}
