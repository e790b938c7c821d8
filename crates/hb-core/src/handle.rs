use std::any::Any;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostHandle(usize);

impl HostHandle {
    pub const fn new(raw: usize) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> usize {
        self.0
    }
}

impl From<usize> for HostHandle {
    fn from(raw: usize) -> Self {
        Self(raw)
    }
}

impl fmt::Display for HostHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handle#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

impl SessionId {
    pub fn next() -> Self {
        Self(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

impl ObjectId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeHandle {
    session: SessionId,
    index: usize,
}

impl TypeHandle {
    pub const fn new(session: SessionId, index: usize) -> Self {
        Self { session, index }
    }

    pub const fn session(self) -> SessionId {
        self.session
    }

    pub const fn index(self) -> usize {
        self.index
    }
}

#[derive(Debug)]
pub struct ObjectIdentity {
    session: SessionId,
    id: ObjectId,
    type_handle: TypeHandle,
    type_name: String,
}

impl ObjectIdentity {
    pub fn session(&self) -> SessionId {
        self.session
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn type_handle(&self) -> TypeHandle {
        self.type_handle
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }
}

/// Clones share one identity. Only the allocation a registry bound resolves.
#[derive(Debug, Clone)]
pub struct ObjectRef(Rc<ObjectIdentity>);

impl ObjectRef {
    pub fn new(
        session: SessionId,
        id: ObjectId,
        type_handle: TypeHandle,
        type_name: impl Into<String>,
    ) -> Self {
        Self(Rc::new(ObjectIdentity {
            session,
            id,
            type_handle,
            type_name: type_name.into(),
        }))
    }

    pub fn session(&self) -> SessionId {
        self.0.session
    }

    pub fn id(&self) -> ObjectId {
        self.0.id
    }

    pub fn type_handle(&self) -> TypeHandle {
        self.0.type_handle
    }

    pub fn type_name(&self) -> &str {
        &self.0.type_name
    }

    pub fn downgrade(&self) -> Weak<ObjectIdentity> {
        Rc::downgrade(&self.0)
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

pub trait CarriesIdentity {
    fn identity(&self) -> &ObjectIdentity;
}

impl CarriesIdentity for ObjectRef {
    fn identity(&self) -> &ObjectIdentity {
        &self.0
    }
}

#[derive(Clone)]
pub struct FunctionRef {
    name: String,
    target: Rc<dyn Any>,
}

impl FunctionRef {
    pub fn new<T: 'static>(name: impl Into<String>, target: T) -> Self {
        Self {
            name: name.into(),
            target: Rc::new(target),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn downcast<T: 'static>(&self) -> Option<&T> {
        self.target.downcast_ref::<T>()
    }
}

impl PartialEq for FunctionRef {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.target, &other.target)
    }
}

impl fmt::Debug for FunctionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FunctionRef").field(&self.name).finish()
    }
}
