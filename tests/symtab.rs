//! Packages, symbols and linker names as seen from outside the crate.

use archgen::symtab::{hard_coded_pkg_id, Abi, SymbolTable, NOT_HARD_CODED};
use archgen::CompileError;
use object::SymbolKind;
use std::sync::Arc;

#[test]
fn test_package_identity_and_names() {
    let st = SymbolTable::new("example.com/app", "app");
    let a = st.new_pkg("encoding/json", "json").unwrap();
    let b = st.new_pkg("encoding/json", "").unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(a.prefix(), "encoding/json");

    let err = st.new_pkg("encoding/json", "xml").unwrap_err();
    assert_eq!(
        err,
        CompileError::ConflictingPackage {
            path: "encoding/json".into(),
            existing: "json".into(),
            requested: "xml".into(),
        }
    );

    let paths: Vec<String> = st.packages().iter().map(|p| p.path().to_string()).collect();
    assert_eq!(paths, ["encoding/json", "example.com/app"]);
}

#[test]
fn test_linker_names() {
    let st = SymbolTable::new("main", "main");
    let yaml = st.new_pkg("gopkg.in/yaml.v2", "yaml").unwrap();
    let f = yaml.lookup("Unmarshal");
    st.import_func(&f).unwrap();
    let ls = st.linksym(&f);
    assert_eq!(&*ls.name, "gopkg.in/yaml%2ev2.Unmarshal");
    assert_eq!(ls.abi, Abi::Internal);
    assert_eq!(ls.kind, SymbolKind::Text);

    let types = st.new_pkg("type", "").unwrap();
    let t = types.lookup("int");
    assert_eq!(&*st.linksym(&t).name, "type:int");
    assert_eq!(st.linksym(&t).kind, SymbolKind::Data);

    let v = st.local_pkg().lookup("counter");
    v.set_linkname("runtime.counter").unwrap();
    let ls = st.linksym(&v);
    assert_eq!(&*ls.name, "runtime.counter");
    assert_eq!(&*ls.pkg, "_");
}

#[test]
fn test_linker_symbols_are_unique_per_abi() {
    let st = SymbolTable::new("main", "main");
    let f = st.local_pkg().lookup("F");
    let abi0 = st.linksym_abi(&f, Abi::Abi0);
    let internal = st.linksym_abi(&f, Abi::Internal);
    assert!(Arc::ptr_eq(&abi0, &st.linksym_abi(&f, Abi::Abi0)));
    assert!(!Arc::ptr_eq(&abi0, &internal));
    assert_eq!(abi0.name, internal.name);
    assert!(st.link_get("main.F", Abi::Internal).is_some());
    assert_eq!(st.linksyms().len(), 2);
}

#[test]
fn test_redeclaration() {
    let st = SymbolTable::new("main", "main");
    let os = st.new_pkg("os", "os").unwrap();
    let args = os.lookup("Args");
    st.import_var(&args).unwrap();
    assert!(matches!(st.import_func(&args), Err(CompileError::SymbolRedeclared { .. })));
    assert!(!args.is_func());
}

#[test]
fn test_numbered_and_selector_symbols() {
    let st = SymbolTable::new("main", "main");
    let pkg = st.local_pkg();
    let tmp = pkg.lookup_num("autotmp_", 12).unwrap();
    assert_eq!(tmp.name(), "autotmp_12");
    assert!(Arc::ptr_eq(&tmp, &pkg.lookup("autotmp_12")));
    assert!(matches!(
        pkg.lookup_num(&"x".repeat(64), 1),
        Err(CompileError::PrefixTooLong { .. })
    ));

    let other = st.new_pkg("strings", "strings").unwrap();
    assert!(Arc::ptr_eq(&st.selector(&other, "Len"), &st.selector(pkg, "Len")));
    assert!(!Arc::ptr_eq(&st.selector(&other, "len"), &st.selector(pkg, "len")));
}

#[test]
fn test_hard_coded_ids() {
    assert_eq!(hard_coded_pkg_id("internal/cpu"), -2);
    assert_eq!(hard_coded_pkg_id("runtime"), -13);
    assert!(hard_coded_pkg_id("runtime/internal/atomic") < NOT_HARD_CODED);
    assert_eq!(hard_coded_pkg_id("fmt"), NOT_HARD_CODED);
}

#[test]
fn test_symbol_order_across_packages() {
    let st = SymbolTable::new("main", "main");
    let a = st.new_pkg("a", "a").unwrap();
    let b = st.new_pkg("b", "b").unwrap();
    let mut syms = vec![a.lookup("x"), b.lookup("x"), a.lookup("Z"), b.lookup("Y"), a.lookup("w")];

    for s in &syms {
        assert!(!s.less(s), "{}", s.name());
    }
    for x in &syms {
        for y in &syms {
            for z in &syms {
                if x.less(y) && y.less(z) {
                    assert!(x.less(z), "{} {} {}", x.name(), y.name(), z.name());
                }
            }
        }
    }

    syms.sort_by(|x, y| x.compare(y));
    let names: Vec<String> = syms.iter().map(|s| format!("{}.{}", s.pkg_path(), s.name())).collect();
    assert_eq!(names, ["b.Y", "a.Z", "a.w", "a.x", "b.x"]);
}
