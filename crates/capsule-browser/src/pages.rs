//! Locally synthesized pages.
//!
//! `home://` lists built-in links and the user's bookmarks; `help://` is
//! static. Both are served as `20 text/gemini` without touching the
//! network.

use std::fmt::Write;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub const HOME_URL: &str = "home://";
pub const HELP_URL: &str = "help://";

/// A named link shown on the home page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmark {
    pub url: String,
    pub name: String,
}

impl Bookmark {
    pub fn new(url: &str, name: &str) -> Self {
        Self {
            url: url.to_string(),
            name: name.to_string(),
        }
    }
}

/// Supplies the user's bookmarks. Persistence lives outside the engine.
pub trait BookmarkSource: Send + Sync {
    fn bookmarks(&self) -> Vec<Bookmark>;
}

impl BookmarkSource for Vec<Bookmark> {
    fn bookmarks(&self) -> Vec<Bookmark> {
        self.clone()
    }
}

const HELP_TEXT: &str = "\
# Help

## Navigation

```
<number>          follow link
t <number>        follow link in a new tab
g <url>           go to URL
b                 back
f                 forward
r                 reload
H                 home page
```

## Tabs

```
n <url>           open a new tab
tab <number>      switch tab
q                 close tab
```

## Page

```
j / k             scroll down / up
d <path>          save the page to a file
s                 show session status
```

## Prompts

```
y / n             answer a question
<text>            answer an input prompt
.                 cancel an input prompt
```
";

/// Renders the pseudo-pages.
pub struct Pages {
    builtin: Vec<Bookmark>,
    bookmarks: Arc<dyn BookmarkSource>,
}

impl Pages {
    pub fn new(builtin: Vec<Bookmark>, bookmarks: Arc<dyn BookmarkSource>) -> Self {
        Self { builtin, bookmarks }
    }

    pub fn is_pseudo(url: &str) -> bool {
        url == HOME_URL || url == HELP_URL
    }

    /// Body for a pseudo-page, or `None` if `url` is not one.
    pub fn render(&self, url: &str) -> Option<String> {
        match url {
            HOME_URL => Some(self.home()),
            HELP_URL => Some(HELP_TEXT.to_string()),
            _ => None,
        }
    }

    fn home(&self) -> String {
        let mut buf = String::from("# Home\n\n");
        for link in &self.builtin {
            let _ = writeln!(buf, "=> {} {}", link.url, link.name);
        }
        buf.push('\n');
        for link in self.bookmarks.bookmarks() {
            let _ = writeln!(buf, "=> {} {}", link.url, link.name);
        }
        buf
    }
}

impl Default for Pages {
    fn default() -> Self {
        Self::new(Vec::new(), Arc::new(Vec::<Bookmark>::new()))
    }
}
