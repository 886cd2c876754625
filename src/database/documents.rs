use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::Document;
use crate::models::{Group, Post, User};

impl Document for User {
    const COLLECTION: &'static str = "users";
    const UNIQUE_FIELDS: &'static [&'static str] = &["email"];

    fn id(&self) -> Uuid {
        self.id
    }

    fn is_active(&self) -> bool {
        self.is_active
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn before_save(&mut self) {
        self.updated_at = Utc::now();
    }
}

impl Document for Group {
    const COLLECTION: &'static str = "groups";

    fn id(&self) -> Uuid {
        self.id
    }

    fn is_active(&self) -> bool {
        self.is_active
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn before_save(&mut self) {
        self.refresh_member_count();
        self.updated_at = Utc::now();
    }
}

impl Document for Post {
    const COLLECTION: &'static str = "posts";

    fn id(&self) -> Uuid {
        self.id
    }

    fn is_active(&self) -> bool {
        self.is_active
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn before_save(&mut self) {
        self.sync_engagement();
        self.updated_at = Utc::now();
    }
}
