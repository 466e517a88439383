//! SeaORM entity models for the SQLite-backed gateway.
//!
//! Three tables: `sessions` (one row per connection), `keystrokes` (append-
//! only capture chunks), `uploads` (one row per captured SFTP write-close).
//! No joins are performed anywhere in the gateway, so relations are left
//! empty rather than wired up for their own sake.

pub mod sessions {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "sessions")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: String,
        pub source_addr: String,
        pub username: String,
        pub credential_kind: String,
        pub credential_value: String,
        pub container_id: Option<String>,
        pub started_at: String,
        pub ended_at: Option<String>,
        pub duration_seconds: Option<i64>,
        pub status: String,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod keystrokes {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "keystrokes")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i32,
        pub session_id: String,
        pub timestamp: String,
        pub direction: String,
        pub data_base64: String,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod uploads {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "uploads")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i32,
        pub session_id: String,
        pub filename: String,
        pub size_bytes: i64,
        pub content_hash: String,
        pub uploaded_at: String,
        pub file_ref: String,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub use keystrokes::Entity as KeystrokeEntity;
pub use sessions::Entity as SessionEntity;
pub use uploads::Entity as UploadEntity;
