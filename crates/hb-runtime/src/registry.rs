use std::collections::HashMap;
use std::rc::Weak;

use hb_core::{
    CarriesIdentity, HostHandle, IdentityError, ObjectId, ObjectIdentity, ObjectRef, SessionId,
    TypeHandle,
};

#[derive(Debug)]
struct Binding {
    handle: HostHandle,
    object: Weak<ObjectIdentity>,
}

#[derive(Debug)]
pub struct IdentityRegistry {
    session: SessionId,
    next_object: u64,
    bindings: HashMap<ObjectId, Binding>,
}

impl IdentityRegistry {
    pub fn new(session: SessionId) -> Self {
        Self {
            session,
            next_object: 1,
            bindings: HashMap::new(),
        }
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    pub fn allocate(&mut self, type_handle: TypeHandle, type_name: &str) -> ObjectRef {
        let id = ObjectId::new(self.next_object);
        self.next_object += 1;
        ObjectRef::new(self.session, id, type_handle, type_name)
    }

    pub fn bind(&mut self, object: &ObjectRef, handle: HostHandle) -> Result<(), IdentityError> {
        self.check_owner(object.identity())?;
        if let Some(existing) = self.bindings.get(&object.id()) {
            return Err(IdentityError::AlreadyBound {
                object: object.id(),
                existing: existing.handle,
            });
        }
        self.bindings.insert(
            object.id(),
            Binding {
                handle,
                object: object.downgrade(),
            },
        );
        Ok(())
    }

    pub fn resolve(&self, object: &impl CarriesIdentity) -> Result<HostHandle, IdentityError> {
        let identity = object.identity();
        self.check_owner(identity)?;
        let binding = self
            .bindings
            .get(&identity.id())
            .ok_or_else(|| IdentityError::Unbound {
                object: identity.id(),
                type_name: identity.type_name().to_string(),
            })?;
        if !std::ptr::eq(binding.object.as_ptr(), identity) {
            return Err(IdentityError::Counterfeit {
                object: identity.id(),
                type_name: identity.type_name().to_string(),
            });
        }
        Ok(binding.handle)
    }

    pub fn prune(&mut self) -> usize {
        let before = self.bindings.len();
        self.bindings
            .retain(|_, binding| binding.object.strong_count() > 0);
        before - self.bindings.len()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn clear(&mut self) {
        self.bindings.clear();
    }

    fn check_owner(&self, identity: &ObjectIdentity) -> Result<(), IdentityError> {
        if identity.session() != self.session {
            return Err(IdentityError::ForeignSession {
                object: identity.id(),
                owner: identity.session(),
                session: self.session,
            });
        }
        Ok(())
    }
}
