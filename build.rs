//! Build script for Voyager.
//!
//! Currently a no-op placeholder. The discovery protocol types and the etcd
//! v3 client subset are implemented directly in Rust (see src/wire/ and
//! src/store/etcdpb.rs) rather than generated from protobuf definitions.
//!
//! This approach was chosen because:
//! - It avoids proto file dependencies and build-time codegen complexity
//! - It keeps the wire surface small and reviewable in one place
//! - The etcd API subset used by Voyager is stable
//!
//! If proto-based codegen is needed in the future, tonic-build can be
//! configured here to compile proto files from a `proto/` directory.

fn main() {
    // Rerun if build.rs changes
    println!("cargo:rerun-if-changed=build.rs");
}
