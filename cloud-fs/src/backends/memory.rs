use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use spin::Mutex;

use crate::store::{KvTable, ObjectStore, StoreError};

/// 内存后端。克隆体共享同一份数据，
/// 因此同一个 `MemoryStore` 可以横跨多次挂载存活。
#[derive(Default, Clone)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    created: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前存有的键数，测试用
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 某个键是否在存储中，测试用
    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().contains_key(key)
    }

    /// 直查一个键，测试用；同时也是两个契约共用的实现
    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.entries.lock().insert(key.to_owned(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.lock().remove(key);
        Ok(())
    }

    fn describe(&self) -> Result<bool, StoreError> {
        Ok(self.created.load(Ordering::Relaxed))
    }

    fn create(&self) -> Result<(), StoreError> {
        self.created.store(true, Ordering::Relaxed);
        Ok(())
    }
}

impl ObjectStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        MemoryStore::get(self, key)
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        MemoryStore::put(self, key, value)
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        MemoryStore::delete(self, key)
    }

    fn describe(&self) -> Result<bool, StoreError> {
        MemoryStore::describe(self)
    }

    fn create(&self) -> Result<(), StoreError> {
        MemoryStore::create(self)
    }
}

impl KvTable for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        MemoryStore::get(self, key)
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        MemoryStore::put(self, key, value)
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        MemoryStore::delete(self, key)
    }

    fn describe(&self) -> Result<bool, StoreError> {
        MemoryStore::describe(self)
    }

    fn create(&self) -> Result<(), StoreError> {
        MemoryStore::create(self)
    }
}
