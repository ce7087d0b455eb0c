use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::Result;
use crate::model::{IdentityId, Profile};
use crate::policy::{self, Operation};
use crate::triggers;

use super::{Store, visible};

pub(crate) async fn insert_row(conn: &mut SqliteConnection, profile: &Profile) -> Result<()> {
    sqlx::query("INSERT INTO profiles (id,handle,display_name,avatar_url,bio,created_at,updated_at) VALUES (?,?,?,?,?,?,?)")
        .bind(profile.id)
        .bind(&profile.handle)
        .bind(&profile.display_name)
        .bind(&profile.avatar_url)
        .bind(&profile.bio)
        .bind(profile.created_at)
        .bind(profile.updated_at)
        .execute(conn)
        .await?;
    Ok(())
}

impl Store {
    pub async fn get_profile(&self, caller: IdentityId, id: IdentityId) -> Result<Option<Profile>> {
        self.get(caller, id).await
    }

    pub async fn find_profile_by_handle(
        &self,
        caller: IdentityId,
        handle: &str,
    ) -> Result<Option<Profile>> {
        let mut tx = self.read().await?;
        let rows: Vec<Profile> = sqlx::query_as("SELECT * FROM profiles WHERE handle = ?")
            .bind(handle)
            .fetch_all(&mut *tx)
            .await?;
        Ok(visible(&mut tx, caller, rows).await?.into_iter().next())
    }

    pub async fn list_profiles(&self, caller: IdentityId) -> Result<Vec<Profile>> {
        let mut tx = self.read().await?;
        let rows = sqlx::query_as("SELECT * FROM profiles ORDER BY rowid")
            .fetch_all(&mut *tx)
            .await?;
        visible(&mut tx, caller, rows).await
    }

    /// Explicit profile creation. Normally the signup event already made one, in
    /// which case this fails as a duplicate.
    pub async fn insert_profile(&self, caller: IdentityId, profile: Profile) -> Result<Profile> {
        let mut w = self.begin().await?;
        let profile = Profile {
            created_at: w.now,
            updated_at: w.now,
            ..profile
        };
        policy::authorize(w.conn(), caller, Operation::Insert, &profile.clone().into()).await?;
        insert_row(w.conn(), &profile).await?;
        w.commit().await?;
        debug!(id = %profile.id, "profile inserted");
        Ok(profile)
    }

    pub async fn update_profile(&self, caller: IdentityId, profile: Profile) -> Result<Profile> {
        let mut w = self.begin().await?;
        let old: Profile = w.load(caller, Operation::Update, profile.id).await?;
        let mut new = Profile {
            id: old.id,
            created_at: old.created_at,
            ..profile
        };
        triggers::before_update(&w, &old, &mut new);
        sqlx::query("UPDATE profiles SET handle=?, display_name=?, avatar_url=?, bio=?, updated_at=? WHERE id=?")
            .bind(&new.handle)
            .bind(&new.display_name)
            .bind(&new.avatar_url)
            .bind(&new.bio)
            .bind(new.updated_at)
            .bind(new.id)
            .execute(w.conn())
            .await?;
        w.commit().await?;
        debug!(id = %new.id, "profile updated");
        Ok(new)
    }
}
