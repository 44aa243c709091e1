//! 키-값 저장소 추상화.
//!
//! 세션, Refresh Token, 로그인 시도, 요청 한도 윈도우는 모두 [`Store`]를 통해
//! 접근합니다. 운영 환경에서는 외부 캐시로 교체할 수 있고, 단일 프로세스
//! 빌드에서는 샤딩된 동시성 맵 기반의 [`MemoryStore`]를 사용합니다.
//!
//! # 원자성
//!
//! [`Store::update`]는 한 키에 대한 read-modify-write를 하나의 임계 구역으로
//! 실행해야 합니다. 동시에 들어온 실패 기록이나 요청 카운트가 유실되면
//! 잠금/요청 한도를 우회할 수 있기 때문입니다.
//!
//! 클로저 안에서 같은 저장소를 다시 호출하면 안 됩니다 (샤드 락 재진입).

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// 레코드 저장소.
pub trait Store<V>: Send + Sync
where
    V: Clone + Send + Sync + 'static,
{
    /// 키로 조회.
    fn get(&self, key: &str) -> Option<V>;

    /// 저장 (기존 값 반환).
    fn insert(&self, key: String, value: V) -> Option<V>;

    /// 삭제 (삭제된 값 반환).
    fn remove(&self, key: &str) -> Option<V>;

    /// 키 단위 원자적 갱신.
    ///
    /// 클로저는 현재 값을 받아 새 값을 반환합니다. `None`을 반환하면 키가
    /// 삭제됩니다.
    fn update(&self, key: &str, f: &mut dyn FnMut(Option<V>) -> Option<V>);

    /// `keep`이 false를 반환한 항목을 삭제하고 삭제 수를 반환.
    ///
    /// 전체 테이블 락을 잡지 않고 샤드/키 단위로 진행해야 합니다.
    fn retain(&self, keep: &mut dyn FnMut(&str, &V) -> bool) -> usize;

    /// 조건에 맞는 항목의 복사본 수집.
    fn collect(&self, filter: &mut dyn FnMut(&str, &V) -> bool) -> Vec<(String, V)>;

    /// 저장된 항목 수.
    fn len(&self) -> usize;

    /// 비어 있는지 여부.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 공유 저장소 핸들.
pub type SharedStore<V> = Arc<dyn Store<V>>;

/// `DashMap` 기반 인메모리 저장소.
///
/// 키가 속한 샤드의 락만 잡으므로 서로 다른 키에 대한 요청은 경합하지 않습니다.
#[derive(Debug)]
pub struct MemoryStore<V> {
    map: DashMap<String, V>,
}

impl<V> MemoryStore<V> {
    /// 빈 저장소 생성.
    pub fn new() -> Self {
        Self {
            map: DashMap::new(),
        }
    }
}

impl<V> MemoryStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// 공유 핸들로 생성.
    pub fn shared() -> SharedStore<V> {
        Arc::new(Self::new())
    }
}

impl<V> Default for MemoryStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> Store<V> for MemoryStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn get(&self, key: &str) -> Option<V> {
        self.map.get(key).map(|entry| entry.value().clone())
    }

    fn insert(&self, key: String, value: V) -> Option<V> {
        self.map.insert(key, value)
    }

    fn remove(&self, key: &str) -> Option<V> {
        self.map.remove(key).map(|(_, value)| value)
    }

    fn update(&self, key: &str, f: &mut dyn FnMut(Option<V>) -> Option<V>) {
        match self.map.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => match f(Some(occupied.get().clone())) {
                Some(next) => {
                    occupied.insert(next);
                }
                None => {
                    occupied.remove();
                }
            },
            Entry::Vacant(vacant) => {
                if let Some(next) = f(None) {
                    vacant.insert(next);
                }
            }
        }
    }

    fn retain(&self, keep: &mut dyn FnMut(&str, &V) -> bool) -> usize {
        let mut removed = 0;
        self.map.retain(|key, value| {
            let kept = keep(key.as_str(), value);
            if !kept {
                removed += 1;
            }
            kept
        });
        removed
    }

    fn collect(&self, filter: &mut dyn FnMut(&str, &V) -> bool) -> Vec<(String, V)> {
        self.map
            .iter()
            .filter(|entry| filter(entry.key().as_str(), entry.value()))
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    fn len(&self) -> usize {
        self.map.len()
    }
}
