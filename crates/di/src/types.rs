//! Базовые типы контейнера: ключ сервиса и type-erased экземпляр

use once_cell::sync::Lazy;
use std::{
    any::{type_name, Any, TypeId},
    cmp::Ordering,
    collections::HashSet,
    fmt,
    hash::{Hash, Hasher},
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant, SystemTime},
};

/// Стабильный идентификатор интерфейса.
///
/// Сравнение и хеширование только по `TypeId`, имя типа хранится для
/// диагностики и сообщений об ошибках.
#[derive(Clone, Copy)]
pub struct ServiceKey {
    type_id: TypeId,
    name: &'static str,
}

impl ServiceKey {
    /// Ключ для типа `T` (обычно `dyn Trait`)
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Полное имя типа, как его печатает компилятор
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Имя без путей модулей: `dyn app::infra::Logger` -> `dyn Logger`
    pub fn short_name(&self) -> String {
        shorten_type_name(self.name)
    }

    /// Относится ли тип к примитивам, которые никогда не внедряются
    pub fn is_primitive(&self) -> bool {
        PRIMITIVE_TYPE_IDS.contains(&self.type_id) || is_primitive_type_name(self.name)
    }
}

impl PartialEq for ServiceKey {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for ServiceKey {}

impl Hash for ServiceKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

impl PartialOrd for ServiceKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ServiceKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name
            .cmp(other.name)
            .then_with(|| self.type_id.cmp(&other.type_id))
    }
}

impl fmt::Debug for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServiceKey({})", self.name)
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Type-erased экземпляр сервиса.
///
/// Внутри лежит `Arc<I>`, где `I` - интерфейс, под которым сервис был
/// зарегистрирован. Клоны указывают на один и тот же объект.
#[derive(Clone)]
pub struct ServiceInstance {
    inner: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl ServiceInstance {
    pub fn new<I>(value: Arc<I>) -> Self
    where
        I: ?Sized + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(value),
            type_name: type_name::<I>(),
        }
    }

    /// Получить типизированный `Arc<I>`, если экземпляр зарегистрирован как `I`
    pub fn downcast<I>(&self) -> Option<Arc<I>>
    where
        I: ?Sized + Send + Sync + 'static,
    {
        self.inner.downcast_ref::<Arc<I>>().cloned()
    }

    /// Один и тот же объект (identity, а не равенство значений)
    pub fn ptr_eq(&self, other: &ServiceInstance) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for ServiceInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceInstance")
            .field("type_name", &self.type_name)
            .finish()
    }
}

static PRIMITIVE_TYPE_IDS: Lazy<HashSet<TypeId>> = Lazy::new(|| {
    [
        TypeId::of::<()>(),
        TypeId::of::<bool>(),
        TypeId::of::<char>(),
        TypeId::of::<i8>(),
        TypeId::of::<i16>(),
        TypeId::of::<i32>(),
        TypeId::of::<i64>(),
        TypeId::of::<i128>(),
        TypeId::of::<isize>(),
        TypeId::of::<u8>(),
        TypeId::of::<u16>(),
        TypeId::of::<u32>(),
        TypeId::of::<u64>(),
        TypeId::of::<u128>(),
        TypeId::of::<usize>(),
        TypeId::of::<f32>(),
        TypeId::of::<f64>(),
        TypeId::of::<str>(),
        TypeId::of::<&'static str>(),
        TypeId::of::<String>(),
        TypeId::of::<[u8]>(),
        TypeId::of::<Vec<u8>>(),
        TypeId::of::<Path>(),
        TypeId::of::<PathBuf>(),
        TypeId::of::<Duration>(),
        TypeId::of::<Instant>(),
        TypeId::of::<SystemTime>(),
        TypeId::of::<chrono::DateTime<chrono::Utc>>(),
        TypeId::of::<chrono::DateTime<chrono::Local>>(),
        TypeId::of::<chrono::NaiveDateTime>(),
        TypeId::of::<chrono::NaiveDate>(),
        TypeId::of::<chrono::Duration>(),
        TypeId::of::<serde_json::Value>(),
    ]
    .into_iter()
    .collect()
});

const SCALAR_NAMES: &[&str] = &[
    "()", "bool", "char", "i8", "i16", "i32", "i64", "i128", "isize", "u8", "u16", "u32", "u64",
    "u128", "usize", "f32", "f64", "str", "&str", "alloc::string::String",
    "std::path::PathBuf", "std::path::Path", "core::time::Duration",
    "std::time::Instant", "std::time::SystemTime",
];

const COLLECTION_PREFIXES: &[&str] = &[
    "alloc::vec::Vec<",
    "alloc::collections::vec_deque::VecDeque<",
    "alloc::collections::btree::map::BTreeMap<",
    "alloc::collections::btree::set::BTreeSet<",
    "std::collections::hash::map::HashMap<",
    "std::collections::hash::set::HashSet<",
    "alloc::boxed::Box<[",
    "chrono::",
    "(",
    "[",
];

const OPTION_PREFIX: &str = "core::option::Option<";

/// Классификация по имени типа для generic коллекций и `Option<primitive>`.
///
/// `type_name` не гарантирует формат, поэтому точные типы сначала
/// проверяются по `TypeId` в [`ServiceKey::is_primitive`].
pub fn is_primitive_type_name(name: &str) -> bool {
    let name = name.trim();
    let name = name.strip_prefix("&'static ").unwrap_or(name);

    if SCALAR_NAMES.contains(&name) {
        return true;
    }

    if let Some(inner) = name
        .strip_prefix(OPTION_PREFIX)
        .and_then(|rest| rest.strip_suffix('>'))
    {
        return is_primitive_type_name(inner);
    }

    COLLECTION_PREFIXES
        .iter()
        .any(|prefix| name.starts_with(prefix))
}

pub(crate) fn shorten_type_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut word = String::new();

    let flush = |word: &mut String, out: &mut String| {
        if !word.is_empty() {
            out.push_str(word.rsplit("::").next().unwrap_or(word.as_str()));
            word.clear();
        }
    };

    for c in name.chars() {
        if c.is_alphanumeric() || c == '_' || c == ':' {
            word.push(c);
        } else {
            flush(&mut word, &mut out);
            out.push(c);
        }
    }
    flush(&mut word, &mut out);

    out
}
