mod common;

use std::path::Path;

use common::*;
use gotestgen::cancel::CancelToken;
use tempfile::TempDir;

const CART: &str = "package shop

import \"example.com/shop/store\"

type Cart struct {
\trepo  store.Repo
\titems []string
}

func (c *Cart) Total() (int, error) {
\tsum := 0
\tfor _, id := range c.items {
\t\tit, err := c.repo.Find(id)
\t\tif err != nil {
\t\t\treturn 0, err
\t\t}
\t\tsum += it.Price
\t}
\treturn sum, nil
}
";

const STORE: &str = "package store

type Item struct {
\tPrice int
}

type Repo interface {
\tFind(id string) (*Item, error)
}
";

const CART_TEST: &str = "package shop\n\nimport \"testing\"\n\nfunc TestEmptyCart(t *testing.T) {}\n";
const STORE_TEST: &str = "package store\n\nimport \"testing\"\n\nfunc TestItem(t *testing.T) {}\n";
const ORPHAN_TEST: &str = "package store\n\nimport \"testing\"\n\nfunc TestGone(t *testing.T) {}\n";

fn shop_module() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write(root, "go.mod", "module example.com/shop\n\ngo 1.21\n");
    write(root, "cart.go", CART);
    write(root, "cart_test.go", CART_TEST);
    write(root, "store/store.go", STORE);
    write(root, "store/store_test.go", STORE_TEST);
    write(root, "store/gone_test.go", ORPHAN_TEST);
    dir
}

fn initial_prompt(repo: &Path, test_count: usize, own_test: bool, seed: u64) -> String {
    let mut cfg = config(repo, "cart.go", "(*Cart).Total", 0);
    cfg.test_count = test_count;
    cfg.use_func_test_file = own_test;
    cfg.seed = Some(seed);
    let model = ScriptedModel::always("func TestTotal(t *testing.T) {}");
    let executor = ScriptedExecutor::always(passed());

    let report =
        gotestgen::run(&cfg, &model, &executor, &CancelToken::new(), &mut Vec::new()).unwrap();
    report.context.initial().to_string()
}

#[test]
fn definitions_are_grouped_by_package_in_name_order() {
    let repo = shop_module();
    let prompt = initial_prompt(repo.path(), 0, false, 1);

    let given = prompt.find("Given:\n").unwrap();
    let shop = prompt.find("package shop\n").unwrap();
    let store = prompt.find("package store\n").unwrap();
    let focal = prompt.find("Write a Go test for:\n").unwrap();
    assert!(given < shop && shop < store && store < focal);

    assert!(prompt.contains("type Cart struct {"));
    assert!(prompt.contains("type Item struct {"));
    assert!(prompt.contains("type Repo interface {"));
    assert!(prompt[focal..].contains("func (c *Cart) Total() (int, error) {"));
    assert!(prompt.ends_with("with no imports or explanations.\n"));
}

#[test]
fn same_seed_builds_the_same_prompt() {
    let a = shop_module();
    let b = shop_module();
    assert_eq!(
        initial_prompt(a.path(), 1, false, 42),
        initial_prompt(b.path(), 1, false, 42)
    );
}

#[test]
fn orphaned_tests_are_never_examples() {
    let repo = shop_module();
    let prompt = initial_prompt(repo.path(), 10, false, 3);

    assert!(prompt.starts_with("Using these tests as examples:\n"));
    assert!(prompt.contains("func TestEmptyCart"));
    assert!(prompt.contains("func TestItem"));
    assert!(!prompt.contains("func TestGone"));
}

#[test]
fn own_test_file_is_added_once() {
    let repo = shop_module();
    let prompt = initial_prompt(repo.path(), 0, true, 3);
    assert_eq!(prompt.matches("func TestEmptyCart").count(), 1);
    assert!(!prompt.contains("func TestItem"));

    let repo = shop_module();
    let prompt = initial_prompt(repo.path(), 10, true, 3);
    assert_eq!(prompt.matches("func TestEmptyCart").count(), 1);
}
