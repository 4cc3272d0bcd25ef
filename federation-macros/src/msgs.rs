// 编译期诊断信息集中在此处。

pub(crate) const ERR_EXPOSE_TARGET: &str = "#[expose] only supports structs";
pub(crate) const ERR_EXPOSE_GENERICS: &str =
    "#[expose] cannot register a generic struct; expose a concrete type";
pub(crate) const ERR_CONTAINER_MISSING: &str =
    "#[expose] requires container = \"<name>\"";
pub(crate) const ERR_CONTAINER_NAME: &str =
    "container name may only contain ASCII letters, digits, '_' and '-'";
pub(crate) const ERR_MODULE_PREFIX: &str = "module must start with \"./\", e.g. \"./Widget\"";
pub(crate) const ERR_UNKNOWN_ARG: &str = "unsupported #[expose] argument; expected container or module";
