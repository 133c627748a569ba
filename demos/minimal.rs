//! Minimal autocrud server
//!
//! ```bash
//! cargo run --example minimal
//! ```
//!
//! Then visit:
//! - **API**: <http://localhost:3000/api/authors>
//! - **OpenAPI**: <http://localhost:3000/openapi.json>
//!
//! `DATABASE_URL` selects the database (in-memory SQLite by default) and the
//! `AUTOCRUD_*` variables tune the generated API, e.g.
//! `AUTOCRUD_BASE_PATH=/v1 AUTOCRUD_PREFIXES=Book=library`.

use autocrud::{Api, ApiConfig, MappingRegistry};
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, DbErr, EntityTrait, Schema};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

mod author {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "author")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: Uuid,
        #[sea_orm(column_type = "String(StringLen::N(120))", unique)]
        pub name: String,
        #[sea_orm(column_type = "Text", nullable)]
        pub bio: Option<String>,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {
        #[sea_orm(has_many = "super::book::Entity")]
        Book,
    }

    impl Related<super::book::Entity> for Entity {
        fn to() -> RelationDef {
            Relation::Book.def()
        }
    }

    impl ActiveModelBehavior for ActiveModel {}
}

mod book {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "book")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i32,
        pub title: String,
        pub published: Option<Date>,
        #[sea_orm(default_value = false)]
        pub out_of_print: bool,
        pub author_id: Uuid,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {
        #[sea_orm(
            belongs_to = "super::author::Entity",
            from = "Column::AuthorId",
            to = "super::author::Column::Id"
        )]
        Author,
    }

    impl Related<super::author::Entity> for Entity {
        fn to() -> RelationDef {
            Relation::Author.def()
        }
    }

    impl ActiveModelBehavior for ActiveModel {}
}

async fn create_table<E: EntityTrait>(db: &DatabaseConnection, entity: E) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let mut statement = Schema::new(backend).create_table_from_entity(entity);
    statement.if_not_exists();
    db.execute(backend.build(&statement)).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("autocrud=debug,tower_http=info")),
        )
        .init();

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite::memory:".to_owned());
    let db = Database::connect(&database_url).await?;
    create_table(&db, author::Entity).await?;
    create_table(&db, book::Entity).await?;

    let mut registry = MappingRegistry::new();
    registry
        .register::<author::Entity>()
        .register::<book::Entity>();

    let mut api = Api::new(ApiConfig::from_env()?);
    api.init(&db, &registry)?;

    let app = api
        .router()
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = TcpListener::bind("0.0.0.0:3000").await?;
    let port = listener.local_addr()?.port();
    for group in api.route_groups() {
        tracing::info!(
            "{} served at http://localhost:{port}{}",
            group.entity_name(),
            group.url_prefix()
        );
    }
    axum::serve(listener, app).await?;
    Ok(())
}
