//! Temporary storage of partner data during key establishment

use psila_crypto::{Certificate, PublicKey, Smac};

use crate::Error;

/// Partner certificate, partner ephemeral key and one SMAC
#[derive(Clone, Debug, Default)]
pub struct TemporaryStorage {
    certificate: Option<Certificate>,
    public_key: Option<PublicKey>,
    smac: Option<Smac>,
}

impl TemporaryStorage {
    /// Store the partner certificate
    pub fn store_certificate(&mut self, certificate: &Certificate) -> Result<(), Error> {
        if self.public_key.is_some() {
            return Err(Error::StorageOrder);
        }
        self.certificate = Some(*certificate);
        Ok(())
    }

    /// Store the partner ephemeral public key, the certificate must be stored first
    pub fn store_public_key(&mut self, key: &PublicKey) -> Result<(), Error> {
        if self.certificate.is_none() {
            return Err(Error::StorageOrder);
        }
        self.public_key = Some(*key);
        Ok(())
    }

    /// Take the partner certificate and ephemeral public key
    pub fn retrieve_and_clear(&mut self) -> Option<(Certificate, PublicKey)> {
        let certificate = self.certificate.take();
        let key = self.public_key.take();
        match (certificate, key) {
            (Some(certificate), Some(key)) => Some((certificate, key)),
            (_, _) => None,
        }
    }

    /// Store a SMAC
    pub fn store_smac(&mut self, smac: &Smac) {
        self.smac = Some(*smac);
    }

    /// The stored SMAC
    pub fn smac(&self) -> Option<&Smac> {
        self.smac.as_ref()
    }

    /// Clear all stored data
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn certificate_before_key() {
        let mut storage = TemporaryStorage::default();
        assert_eq!(storage.store_public_key(&PublicKey::new([2; 22])), Err(Error::StorageOrder));
        storage.store_certificate(&Certificate::new([1; 48])).unwrap();
        storage.store_public_key(&PublicKey::new([2; 22])).unwrap();
        assert_eq!(storage.store_certificate(&Certificate::new([3; 48])), Err(Error::StorageOrder));
        let (certificate, key) = storage.retrieve_and_clear().unwrap();
        assert_eq!(certificate, Certificate::new([1; 48]));
        assert_eq!(key, PublicKey::new([2; 22]));
        assert_eq!(storage.retrieve_and_clear(), None);
    }

    #[test]
    fn smac_survives_retrieve() {
        let mut storage = TemporaryStorage::default();
        storage.store_smac(&Smac::new([7; 16]));
        storage.store_certificate(&Certificate::new([1; 48])).unwrap();
        assert_eq!(storage.retrieve_and_clear(), None);
        assert_eq!(storage.smac(), Some(&Smac::new([7; 16])));
        storage.clear();
        assert_eq!(storage.smac(), None);
    }
}
