// Copyright 2025 dentsusoken
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::error::{LockError, Result};
use crate::query_interface::QueryInterface;
use crate::query_interface::postgres::{PostgresPoolQueryInterface, PostgresQueryInterface};
use log::debug;
use std::any::Any;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

/// Opaque database client handed to the registry.
pub type ClientHandle = Box<dyn Any + Send>;

/// Predicate used to recognise a client without an explicit adapter name.
pub type CheckInterface = fn(&(dyn Any + Send)) -> bool;

/// Builds an adapter around a client, rejecting clients of the wrong type.
pub type ConstructQueryInterface = fn(ClientHandle) -> Result<Arc<dyn QueryInterface>>;

#[derive(Clone)]
pub struct QueryInterfaceRegistration {
    pub interface_name: String,
    pub check_interface: Option<CheckInterface>,
    pub construct: ConstructQueryInterface,
}

impl QueryInterfaceRegistration {
    pub fn new(interface_name: impl Into<String>, construct: ConstructQueryInterface) -> Self {
        Self {
            interface_name: interface_name.into(),
            check_interface: None,
            construct,
        }
    }

    pub fn with_check(mut self, check_interface: CheckInterface) -> Self {
        self.check_interface = Some(check_interface);
        self
    }

    fn matches(&self, client: &(dyn Any + Send)) -> bool {
        self.check_interface.is_some_and(|check| check(client))
    }
}

static REGISTRY: OnceLock<RwLock<Vec<QueryInterfaceRegistration>>> = OnceLock::new();

fn registry() -> &'static RwLock<Vec<QueryInterfaceRegistration>> {
    REGISTRY.get_or_init(|| {
        RwLock::new(vec![
            PostgresQueryInterface::registration(),
            PostgresPoolQueryInterface::registration(),
        ])
    })
}

/// Adds an adapter, replacing any existing entry with the same name in place.
///
/// New names are appended, so auto-detection keeps trying the bundled
/// adapters first.
pub fn register_query_interface(registration: QueryInterfaceRegistration) {
    let mut entries = registry().write().unwrap_or_else(PoisonError::into_inner);
    match entries
        .iter_mut()
        .find(|entry| entry.interface_name == registration.interface_name)
    {
        Some(existing) => *existing = registration,
        None => entries.push(registration),
    }
}

pub fn registered_query_interfaces() -> Vec<String> {
    registry()
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .iter()
        .map(|entry| entry.interface_name.clone())
        .collect()
}

/// Finds the first registered adapter whose check accepts `client`.
pub fn locate_query_interface_name(client: &(dyn Any + Send)) -> Result<String> {
    registry()
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .iter()
        .find(|entry| entry.matches(client))
        .map(|entry| entry.interface_name.clone())
        .ok_or(LockError::UnableToLocateQueryInterface)
}

/// Wraps `client` in the adapter named `interface_name`, or in the first
/// adapter that recognises it when no name is given.
pub fn get_query_interface(
    client: ClientHandle,
    interface_name: Option<&str>,
) -> Result<Arc<dyn QueryInterface>> {
    let name = match interface_name {
        Some(name) => name.to_string(),
        None => locate_query_interface_name(client.as_ref())?,
    };

    let construct = registry()
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .iter()
        .find(|entry| entry.interface_name == name)
        .map(|entry| entry.construct)
        .ok_or_else(|| LockError::UnknownQueryInterface(name.clone()))?;

    debug!("Resolved query interface '{name}'");
    construct(client)
}
