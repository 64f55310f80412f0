use aria_pilot::{
    browser::page::RawPage,
    snapshot::snapshot_model::{InteractiveElement, Viewport},
};

pub const HOME_URL: &str = "https://shop.test/";
pub const RESULTS_URL: &str = "https://shop.test/search?q=rust";
pub const ACCOUNT_URL: &str = "https://shop.test/account";

pub const LEARN_MORE_TREE: &str = r#"
- text: Example Domain
- link "Learn more":
  - /url: https://www.iana.org/domains/example
"#;

pub const HOME_TREE: &str = r#"
- banner:
  - link "Home":
    - /url: /
  - navigation "Main":
    - link "Docs"
    - link "Docs"
- main:
  - heading "Welcome" [level=1]
  - searchbox "Search products" [placeholder=Search...]
  - button "Search"
  - text: Free shipping on every order
"#;

pub const RESULTS_TREE: &str = r#"
- main:
  - heading "Results for rust" [level=1]
  - list:
    - listitem:
      - link "The Rust Book"
    - listitem:
      - link "Rust in Action"
  - button "Next page"
"#;

pub const ACCOUNT_TREE: &str = r#"
- main:
  - heading "Account settings" [level=1]
  - textbox "Display name": Ferris
  - button "Save"
  - button "Delete Account"
"#;

pub const OVERLAY_TREE: &str = r#"
- main:
  - button "Search"
- dialog "Cookie consent" [modal]:
  - text: We use cookies
  - button "Accept all"
  - button "Close"
"#;

pub fn raw(url: &str, title: &str, aria: &str, text: &str) -> RawPage {
    RawPage {
        url: url.to_string(),
        title: title.to_string(),
        aria: aria.to_string(),
        text: text.to_string(),
        viewport: Some(viewport()),
        pending_requests: 0,
        loading: false,
    }
}

pub fn viewport() -> Viewport {
    Viewport {
        width: 1280.0,
        height: 720.0,
    }
}

pub fn home_page() -> RawPage {
    raw(HOME_URL, "Shop", HOME_TREE, "Welcome to the shop. Free shipping on every order.")
}

pub fn results_page() -> RawPage {
    raw(RESULTS_URL, "Search results", RESULTS_TREE, "Results for rust: The Rust Book, Rust in Action")
}

pub fn account_page() -> RawPage {
    raw(ACCOUNT_URL, "Account", ACCOUNT_TREE, "Account settings")
}

/// `count` buttons named `Item 0`, `Item 1`, ...
pub fn many_buttons(count: usize) -> String {
    (0..count).map(|i| format!("- button \"Item {i}\"\n")).collect()
}

pub fn element(role: &str, name: &str) -> InteractiveElement {
    InteractiveElement::new(role, name)
}
