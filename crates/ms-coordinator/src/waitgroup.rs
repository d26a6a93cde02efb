use std::sync::{Condvar, Mutex, PoisonError};

/// Compteur de workers encore présents, attendu à la fin du run.
///
/// RegisterWorker incrémente, DeRegisterWorker décrémente (y compris
/// via le chemin de l'appel nominal manqué) ; la fin de run attend
/// zéro.
pub(crate) struct WaitGroup {
    count: Mutex<usize>,
    cond: Condvar,
}

impl WaitGroup {
    pub fn new() -> Self {
        Self {
            count: Mutex::new(0),
            cond: Condvar::new(),
        }
    }

    pub fn add(&self) {
        let mut count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
        *count += 1;
    }

    pub fn done(&self) {
        let mut count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
        if *count == 0 {
            log::warn!("WaitGroup déjà à zéro");
            return;
        }
        *count -= 1;
        if *count == 0 {
            self.cond.notify_all();
        }
    }

    pub fn count(&self) -> usize {
        *self.count.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Bloque jusqu'à ce que le compteur retombe à zéro.
    pub fn wait(&self) {
        let mut count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
        while *count > 0 {
            count = self
                .cond
                .wait(count)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}
