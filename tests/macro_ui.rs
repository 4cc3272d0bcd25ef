//! UI tests for #[expose]

#[test]
fn ui_expose_generic_struct_fails() {
    let t = trybuild::TestCases::new();
    t.compile_fail("tests/ui/expose_generic.rs");
}

#[test]
fn ui_expose_missing_container_fails() {
    let t = trybuild::TestCases::new();
    t.compile_fail("tests/ui/expose_missing_container.rs");
}

#[test]
fn ui_expose_module_without_prefix_fails() {
    let t = trybuild::TestCases::new();
    t.compile_fail("tests/ui/expose_module_prefix.rs");
}

#[test]
fn ui_expose_min_ok() {
    let t = trybuild::TestCases::new();
    t.pass("tests/ui/expose_min.rs");
}
