//! Built-in backend served by the `bindrpc` binary.
//!
//! `Host` answers liveness and introspection calls. The storage classes only
//! expose their enumeration constants, plus `Volume.getInfo`, which echoes
//! the identity a volume was addressed with.

use crate::error::{BackendError, BridgeError};
use crate::registry::{ApiObject, Bridge, ClassBuilder, CtorArgs, RegistryBuilder};
use bindrpc_protocol::{Params, JSONRPC_VERSION};
use serde_json::{json, Value};
use std::sync::{Arc, OnceLock};

/// Constructor arguments for `Volume`.
pub const VOLUME_CTOR_ARGS: [&str; 4] = ["volumeID", "storagepoolID", "storagedomainID", "imageID"];

/// Builds the default registry.
pub fn default_registry() -> Result<Bridge, BridgeError> {
    default_registry_with(RegistryBuilder::new())
}

/// Adds the built-in classes to `builder`, which may already hold others.
pub fn default_registry_with(builder: RegistryBuilder) -> Result<Bridge, BridgeError> {
    let listing: Arc<OnceLock<Vec<String>>> = Arc::new(OnceLock::new());

    let host_listing = Arc::clone(&listing);
    let bridge = builder
        .class(
            ClassBuilder::new("Host", move |_| {
                Ok(Box::new(Host {
                    listing: Arc::clone(&host_listing),
                }) as Box<dyn ApiObject>)
            })
            .methods(["ping", "getVersion", "getMethods", "echo"]),
        )
        .class(
            ClassBuilder::data("StorageDomain")
                .ctor_args(["storagedomainID"])
                .constant(
                    "Classes",
                    json!({"Data": 1, "Iso": 2, "Backup": 3}),
                )
                .constant(
                    "Types",
                    json!({
                        "UNKNOWN": 0, "NFS": 1, "FCP": 2, "ISCSI": 3,
                        "LOCALFS": 4, "CIFS": 5, "POSIXFS": 6, "GLUSTERFS": 7
                    }),
                ),
        )
        .class(
            ClassBuilder::new("Volume", |ctor_args| {
                Ok(Box::new(Volume { ctor_args }) as Box<dyn ApiObject>)
            })
            .ctor_args(VOLUME_CTOR_ARGS)
            .method("getInfo")
            .constant("Formats", json!({"UNKNOWN": 3, "COW": 4, "RAW": 5}))
            .constant("Types", json!({"UNKNOWN": 0, "PREALLOCATED": 1, "SPARSE": 2}))
            .constant("Roles", json!({"SHARED": 0, "INTERNAL": 1, "LEAF": 2})),
        )
        .class(
            ClassBuilder::data("Image")
                .ctor_args(["imageID", "storagepoolID", "storagedomainID"])
                .constant(
                    "DiskTypes",
                    json!({
                        "UNKNOWN": "UNKNOWN", "SYSTEM": "SYS", "DATA": "DATA",
                        "SHARED": "SHARED", "SWAP": "SWAP", "TEMP": "TEMP"
                    }),
                ),
        )
        .build()?;

    // Set exactly once, right after build; Host reads it at call time
    let _ = listing.set(bridge.methods());
    Ok(bridge)
}

struct Host {
    listing: Arc<OnceLock<Vec<String>>>,
}

impl ApiObject for Host {
    fn call(&mut self, method: &str, params: Params) -> Result<Value, BackendError> {
        match method {
            "ping" => Ok(Value::Bool(true)),
            "getVersion" => Ok(json!({
                "version": env!("CARGO_PKG_VERSION"),
                "jsonrpc": JSONRPC_VERSION,
            })),
            "getMethods" => Ok(json!(self.listing.get().cloned().unwrap_or_default())),
            "echo" => params
                .get("message", 0)
                .cloned()
                .ok_or_else(|| BackendError::invalid_params("echo needs a 'message' parameter")),
            other => Err(BackendError::internal(format!("Host has no member {}", other))),
        }
    }
}

struct Volume {
    ctor_args: CtorArgs,
}

impl ApiObject for Volume {
    fn call(&mut self, method: &str, _params: Params) -> Result<Value, BackendError> {
        match method {
            "getInfo" => {
                for arg in VOLUME_CTOR_ARGS {
                    self.ctor_args.get_str(arg)?;
                }
                Ok(Value::Object(self.ctor_args.clone().into_map()))
            }
            other => Err(BackendError::internal(format!("Volume has no member {}", other))),
        }
    }
}
