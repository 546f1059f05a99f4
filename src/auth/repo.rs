use sqlx::PgPool;
use uuid::Uuid;

use super::repo_types::{ProfileFields, User, USER_COLUMNS};

/// Advisory lock key held while an account is being registered.
const REGISTER_LOCK_KEY: i64 = 0x706f_7274_666f_6c69;

impl User {
    /// Find a user by email.
    pub async fn find_by_email(db: &PgPool, email: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
            .bind(email)
            .fetch_optional(db)
            .await
    }

    pub async fn find_by_id(db: &PgPool, id: Uuid) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(db)
            .await
    }

    /// The portfolio owner: the earliest admin account.
    pub async fn find_owner(db: &PgPool) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE role = 'ADMIN' ORDER BY created_at ASC LIMIT 1"
        ))
        .fetch_optional(db)
        .await
    }

    /// Insert a new account. The first account becomes `ADMIN`, every later
    /// one `USER`; the advisory lock serializes concurrent registrations so
    /// only one of them can see an admin-free table.
    pub async fn register(
        db: &PgPool,
        email: &str,
        password_hash: &str,
        name: &str,
    ) -> Result<User, sqlx::Error> {
        let mut tx = db.begin().await?;
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(REGISTER_LOCK_KEY)
            .execute(&mut *tx)
            .await?;
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (email, password_hash, name, role)
            SELECT $1, $2, $3,
                   CASE WHEN EXISTS (SELECT 1 FROM users WHERE role = 'ADMIN')
                        THEN 'USER' ELSE 'ADMIN' END
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(email)
        .bind(password_hash)
        .bind(name)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(user)
    }

    pub async fn update_profile(db: &PgPool, id: Uuid, p: &ProfileFields) -> Result<User, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
               SET name = $2, title = $3, bio = $4, location = $5, avatar_url = $6,
                   github_url = $7, linkedin_url = $8, twitter_url = $9, website_url = $10,
                   updated_at = now()
             WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&p.name)
        .bind(&p.title)
        .bind(&p.bio)
        .bind(&p.location)
        .bind(&p.avatar_url)
        .bind(&p.github_url)
        .bind(&p.linkedin_url)
        .bind(&p.twitter_url)
        .bind(&p.website_url)
        .fetch_one(db)
        .await
    }
}
