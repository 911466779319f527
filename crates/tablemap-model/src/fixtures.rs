//! Entities shared by the unit tests.

use std::cell::RefCell;

use tablemap_core::{Cx, Error, ModelHooks, Result};
use tablemap_macros::Entity;

thread_local! {
    static HOOK_LOG: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
}

fn record(entry: String) {
    HOOK_LOG.with(|log| log.borrow_mut().push(entry));
}

/// Drain the hooks recorded on this thread.
pub fn take_hook_log() -> Vec<String> {
    HOOK_LOG.with(|log| std::mem::take(&mut *log.borrow_mut()))
}

#[derive(Debug, Default, Entity)]
#[tablemap(table = "users", hooks(before_scan, after_scan))]
pub struct User {
    #[tablemap(pk)]
    pub id: i64,
    pub name: String,
    #[tablemap(rel = "has-one", join = "id=user_id")]
    pub profile: Option<Box<Profile>>,
    #[tablemap(rel = "has-many", join = "id=user_id")]
    pub posts: Vec<Post>,
}

impl ModelHooks for User {
    fn before_scan(&mut self, _cx: &Cx) -> Result<()> {
        record("User.before_scan".to_string());
        Ok(())
    }

    fn after_scan(&mut self, _cx: &Cx) -> Result<()> {
        record(format!("User.after_scan {}", self.name));
        if self.name == "fail-root" {
            return Err(Error::custom("root refused"));
        }
        Ok(())
    }
}

#[derive(Debug, Default, Entity)]
#[tablemap(
    table = "profiles",
    hooks(after_scan, before_insert, before_update, after_delete)
)]
pub struct Profile {
    #[tablemap(pk)]
    pub id: i64,
    pub lang: String,
    pub user_id: i64,
    #[tablemap(skip)]
    pub updates: u32,
}

impl ModelHooks for Profile {
    fn after_scan(&mut self, _cx: &Cx) -> Result<()> {
        record(format!("Profile.after_scan {}", self.lang));
        if self.lang == "fail" {
            return Err(Error::custom("profile refused"));
        }
        Ok(())
    }

    fn before_update(&mut self, _cx: &Cx) -> Result<()> {
        self.updates += 1;
        if self.lang == "fail" {
            return Err(Error::custom("profile refused"));
        }
        Ok(())
    }
}

#[derive(Debug, Default, Entity)]
#[tablemap(table = "posts")]
pub struct Post {
    #[tablemap(pk)]
    pub id: i64,
    pub user_id: i64,
    pub title: String,
}
