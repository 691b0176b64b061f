#[cfg_attr(not(miri), test)]
pub fn macros() {
    let t = trybuild::TestCases::new();
    t.pass("tests/macros/01_basic_usage.rs");
    t.pass("tests/macros/02_methods.rs");
    t.pass("tests/macros/03_async.rs");
    t.pass("tests/macros/04_opaque_return.rs");
}
