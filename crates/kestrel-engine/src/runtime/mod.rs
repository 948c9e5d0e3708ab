//! JavaScript runtime: values, objects, environments and the realm.

pub mod environment;
pub mod function;
pub mod object;
pub mod property;
pub mod proxy;
pub mod realm;
pub mod value;

pub use object::{ObjectKind, ObjectRef};
pub use property::{PropertyDescriptor, PropertyKey};
pub use realm::Realm;
pub use value::Value;
