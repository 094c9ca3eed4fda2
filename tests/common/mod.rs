//! Shared service declarations for integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use strata::{Context, DependentSingletons, DiError, Injector, Instance, ServiceType};

pub trait Storage: Send + Sync {
    fn load(&self, key: &str) -> Option<String>;
    fn save(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
}

pub type StorageRef = Arc<dyn Storage>;

/// Answers every key with the key itself.
pub struct EchoStorage;

impl Storage for EchoStorage {
    fn load(&self, key: &str) -> Option<String> {
        Some(key.to_string())
    }

    fn save(&self, _key: &str, _value: &str) {}

    fn remove(&self, _key: &str) {}
}

#[derive(Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl Storage for MemoryStorage {
    fn load(&self, key: &str) -> Option<String> {
        self.entries.lock().unwrap().get(key).cloned()
    }

    fn save(&self, key: &str, value: &str) {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) {
        self.entries.lock().unwrap().remove(key);
    }
}

/// Stateful service caching friends loaded from storage.
pub struct FriendStorage {
    storage: ServiceType,
    injector: Injector,
    friends: Mutex<BTreeMap<String, String>>,
}

impl FriendStorage {
    pub fn load_friend(&self, id: &str) -> strata::Result<Option<String>> {
        if let Some(name) = self.friends.lock().unwrap().get(id) {
            return Ok(Some(name.clone()));
        }
        let storage = self.injector.invoke(&self.storage)?;
        let loaded = storage_of(&storage).load(id);
        if let Some(name) = &loaded {
            self.friends
                .lock()
                .unwrap()
                .insert(id.to_string(), name.clone());
        }
        Ok(loaded)
    }

    pub fn list_friends(&self) -> Vec<String> {
        self.friends.lock().unwrap().values().cloned().collect()
    }
}

/// Consumer resolving its punctuation when constructed.
pub struct Greeter {
    pub text: String,
}

pub struct Fixture {
    pub storage: ServiceType,
    pub echo_storage: ServiceType,
    pub memory_storage: ServiceType,
    pub friend_storage: ServiceType,
    pub logger: ServiceType,
    pub console_logger: ServiceType,
    pub quiet_logger: ServiceType,
    pub exclamation: ServiceType,
    pub question_mark: ServiceType,
    pub exclamation_mark: ServiceType,
    pub greeter: ServiceType,
}

impl Fixture {
    pub fn new() -> Self {
        let storage = ServiceType::builder("Storage").build();
        let echo_storage = ServiceType::builder("EchoStorage")
            .extends(&storage)
            .constructor(|_| Ok(Arc::new(EchoStorage) as StorageRef))
            .build();
        let memory_storage = ServiceType::builder("MemoryStorage")
            .extends(&storage)
            .constructor(|_| Ok(Arc::new(MemoryStorage::default()) as StorageRef))
            .build();

        let storage_dep = storage.clone();
        let friend_storage = ServiceType::builder("FriendStorage")
            .deps([&storage])
            .constructor(move |c| {
                Ok(FriendStorage {
                    storage: storage_dep.clone(),
                    injector: c.injector(),
                    friends: Mutex::new(BTreeMap::new()),
                })
            })
            .build();

        let logger = ServiceType::builder("Logger").build();
        let console_logger = ServiceType::builder("ConsoleLogger")
            .extends(&logger)
            .constructor(|_| Ok("console"))
            .build();
        let quiet_logger = ServiceType::builder("QuietLogger")
            .extends(&logger)
            .constructor(|_| Ok("quiet"))
            .build();

        let exclamation = ServiceType::builder("Exclamation").build();
        let question_mark = ServiceType::builder("QuestionMark")
            .extends(&exclamation)
            .constructor(|_| Ok("?"))
            .build();
        let exclamation_mark = ServiceType::builder("ExclamationMark")
            .extends(&exclamation)
            .constructor(|_| Ok("!"))
            .build();

        let mark = exclamation.clone();
        let greeter = ServiceType::builder("Greeter")
            .constructor(move |c| {
                let resolved = c.invoke(&mark)?;
                let punctuation = resolved
                    .downcast_ref::<&'static str>()
                    .ok_or_else(|| DiError::construction("Greeter", "punctuation is not text"))?;
                Ok(Greeter {
                    text: format!("Hello{}", punctuation),
                })
            })
            .build();

        Self {
            storage,
            echo_storage,
            memory_storage,
            friend_storage,
            logger,
            console_logger,
            quiet_logger,
            exclamation,
            question_mark,
            exclamation_mark,
            greeter,
        }
    }

    /// Plain memory storage instance, created outside any context.
    pub fn memory_with(&self, entries: &[(&str, &str)]) -> Instance {
        let storage = MemoryStorage::default();
        for (key, value) in entries {
            storage.save(key, value);
        }
        Instance::new(&self.memory_storage, Arc::new(storage) as StorageRef)
    }
}

/// Context with a private singleton cache.
pub fn isolated() -> Context {
    Context::with_singletons(Arc::new(DependentSingletons::new()))
}

pub fn storage_of(instance: &Instance) -> &StorageRef {
    instance
        .downcast_ref::<StorageRef>()
        .expect("instance is not a storage")
}

pub fn friends_of(instance: &Instance) -> &FriendStorage {
    instance
        .downcast_ref::<FriendStorage>()
        .expect("instance is not a friend storage")
}

pub fn greeting(instance: &Instance) -> &str {
    &instance
        .downcast_ref::<Greeter>()
        .expect("instance is not a greeter")
        .text
}
