use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::domain::{ApplicationId, PropertyId, PropertyListing, RentalApplication};
use crate::repository::RepositoryError;

/// A write of one application, optionally together with its property.
#[derive(Debug, Clone)]
pub struct RentalCommit {
    /// Version the caller read; the write fails with `Conflict` if it moved on.
    pub expected_version: u64,
    pub application: RentalApplication,
    /// Property state written in the same atomic step. `require_available` guards
    /// against two approvals racing for one property.
    pub property: Option<PropertyWrite>,
}

#[derive(Debug, Clone)]
pub struct PropertyWrite {
    pub listing: PropertyListing,
    pub require_available: bool,
}

/// Storage abstraction for applications and the property availability they control.
pub trait RentalRepository: Send + Sync {
    fn insert(&self, application: RentalApplication)
        -> Result<RentalApplication, RepositoryError>;
    fn fetch(&self, id: &ApplicationId) -> Result<Option<RentalApplication>, RepositoryError>;
    fn property(&self, id: &PropertyId) -> Result<Option<PropertyListing>, RepositoryError>;
    /// Register or replace a catalog entry. The catalog owns properties; this only
    /// mirrors what the workflow needs.
    fn upsert_property(&self, property: PropertyListing) -> Result<(), RepositoryError>;
    /// Atomically persist `commit`, bumping the application version. Readers never see
    /// the application without the matching property write.
    fn commit(&self, commit: RentalCommit) -> Result<RentalApplication, RepositoryError>;
    /// Read an application and its property in one consistent snapshot.
    fn snapshot(
        &self,
        id: &ApplicationId,
    ) -> Result<Option<(RentalApplication, PropertyListing)>, RepositoryError>;
}

#[derive(Default)]
struct RentalTables {
    applications: HashMap<ApplicationId, RentalApplication>,
    properties: HashMap<PropertyId, PropertyListing>,
}

/// Process-local store keeping applications and properties behind one lock.
#[derive(Default, Clone)]
pub struct InMemoryRentalRepository {
    tables: Arc<Mutex<RentalTables>>,
}

impl RentalRepository for InMemoryRentalRepository {
    fn insert(
        &self,
        application: RentalApplication,
    ) -> Result<RentalApplication, RepositoryError> {
        let mut tables = self.tables.lock().expect("repository mutex poisoned");
        if tables.applications.contains_key(&application.id) {
            return Err(RepositoryError::Conflict);
        }
        tables
            .applications
            .insert(application.id.clone(), application.clone());
        Ok(application)
    }

    fn fetch(&self, id: &ApplicationId) -> Result<Option<RentalApplication>, RepositoryError> {
        let tables = self.tables.lock().expect("repository mutex poisoned");
        Ok(tables.applications.get(id).cloned())
    }

    fn property(&self, id: &PropertyId) -> Result<Option<PropertyListing>, RepositoryError> {
        let tables = self.tables.lock().expect("repository mutex poisoned");
        Ok(tables.properties.get(id).cloned())
    }

    fn upsert_property(&self, property: PropertyListing) -> Result<(), RepositoryError> {
        let mut tables = self.tables.lock().expect("repository mutex poisoned");
        tables.properties.insert(property.id.clone(), property);
        Ok(())
    }

    fn commit(&self, commit: RentalCommit) -> Result<RentalApplication, RepositoryError> {
        let mut tables = self.tables.lock().expect("repository mutex poisoned");

        let stored = tables
            .applications
            .get(&commit.application.id)
            .ok_or(RepositoryError::NotFound)?;
        if stored.version != commit.expected_version {
            return Err(RepositoryError::Conflict);
        }

        if let Some(write) = &commit.property {
            let current = tables
                .properties
                .get(&write.listing.id)
                .ok_or(RepositoryError::NotFound)?;
            if write.require_available && !current.is_available() {
                return Err(RepositoryError::Conflict);
            }
        }

        let mut application = commit.application;
        application.version = commit.expected_version + 1;
        if let Some(write) = commit.property {
            tables.properties.insert(write.listing.id.clone(), write.listing);
        }
        tables
            .applications
            .insert(application.id.clone(), application.clone());
        Ok(application)
    }

    fn snapshot(
        &self,
        id: &ApplicationId,
    ) -> Result<Option<(RentalApplication, PropertyListing)>, RepositoryError> {
        let tables = self.tables.lock().expect("repository mutex poisoned");
        let Some(application) = tables.applications.get(id) else {
            return Ok(None);
        };
        let property = tables
            .properties
            .get(&application.property_id)
            .ok_or(RepositoryError::NotFound)?;
        Ok(Some((application.clone(), property.clone())))
    }
}
