// Handlers are split by surface; every fragment shares this module's scope.
include!("http/core.rs");
include!("http/admin.rs");
include!("http/catalog.rs");
include!("http/speech.rs");
include!("http/proxy.rs");
