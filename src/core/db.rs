use anyhow::anyhow;
use std::path::PathBuf;

use sqlx::{
    migrate::MigrateDatabase,
    sqlite::{Sqlite, SqlitePoolOptions},
    types::time::OffsetDateTime,
    SqlitePool,
};

use crate::error::ClubError;

use super::{
    club::{Club, Contact},
    matches::{Match, UNPLAYED_SCORE},
    player::{Player, DEFAULT_CATEGORY, INITIAL_RATING},
    rating::RatingChange,
    tournament::{Tournament, TournamentMeta, TournamentStatus},
};

/// Club created on first run so the service is usable out of the box.
pub const DEMO_CLUB_ID: i64 = 1;

/// Bounded retries for the enrollment compare-and-swap.
const ENROLL_RETRIES: u32 = 5;

#[derive(Debug)]
pub enum EnrollOutcome {
    Enrolled,
    AlreadyEnrolled,
}

pub struct ClubDb {
    db: SqlitePool,
}

fn unix_now() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

impl ClubDb {
    pub async fn init(file: &PathBuf) -> anyhow::Result<Self> {
        let url = format!(
            "sqlite://{}",
            file.to_str().ok_or_else(|| anyhow!("Invalid db path"))?
        );
        if !Sqlite::database_exists(&url).await.unwrap_or(false) {
            Sqlite::create_database(&url).await?;
        }

        let db = SqlitePool::connect(&url).await?;
        Self::create_tables(&db).await?;
        Ok(ClubDb { db })
    }

    /// A private in-memory database, used by tests.
    pub async fn open_in_memory() -> anyhow::Result<Self> {
        let db = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Self::create_tables(&db).await?;
        Ok(ClubDb { db })
    }

    async fn create_tables(db: &SqlitePool) -> anyhow::Result<()> {
        sqlx::query(
            "create table if not exists clubs(
                    id integer primary key,
                    name text not null,
                    admin_contact text not null unique
                );",
        )
        .execute(db)
        .await?;

        sqlx::query(
            "create table if not exists contacts(
                    id integer primary key,
                    address text not null unique,
                    created_at integer not null
                );",
        )
        .execute(db)
        .await?;

        sqlx::query(
            "create table if not exists players(
                    id integer primary key,
                    name text not null collate nocase,
                    rating integer not null default 1200,
                    category text not null default 'General',
                    wins integer not null default 0,
                    losses integer not null default 0,
                    contact_id integer not null,
                    club_id integer not null,
                    foreign key(contact_id) references contacts(id),
                    foreign key(club_id) references clubs(id)
                );",
        )
        .execute(db)
        .await?;

        sqlx::query(
            "create table if not exists tournaments(
                    id integer primary key,
                    name text not null,
                    category text not null,
                    status text not null,
                    meta text not null,
                    meta_version integer not null default 0,
                    club_id integer not null,
                    foreign key(club_id) references clubs(id)
                );",
        )
        .execute(db)
        .await?;

        sqlx::query(
            "create table if not exists matches(
                    id integer primary key,
                    player_one integer not null,
                    player_two integer not null,
                    winner integer,
                    score text not null,
                    played_at integer not null,
                    finished boolean not null,
                    tournament_id integer,
                    foreign key(player_one) references players(id),
                    foreign key(player_two) references players(id),
                    foreign key(tournament_id) references tournaments(id)
                );",
        )
        .execute(db)
        .await?;

        Ok(())
    }

    /// Creates the demo club on first run so unrecognized contacts have
    /// somewhere to land.
    pub async fn seed_demo_club(&self, admin_contact: Option<&str>) -> anyhow::Result<()> {
        let existing: Option<i64> = sqlx::query_scalar("select id from clubs where id = ?")
            .bind(DEMO_CLUB_ID)
            .fetch_optional(&self.db)
            .await?;

        if existing.is_none() {
            log::info!("Creating demo club");
            sqlx::query("insert into clubs(id, name, admin_contact) values(?, ?, ?)")
                .bind(DEMO_CLUB_ID)
                .bind("Demo Club")
                .bind(admin_contact.unwrap_or("unassigned-admin"))
                .execute(&self.db)
                .await?;
        }

        Ok(())
    }

    pub async fn get_club(&self, club_id: i64) -> anyhow::Result<Club> {
        sqlx::query_as("select * from clubs where id = ? limit 1")
            .bind(club_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or(anyhow!("Failed to find club {}", club_id))
    }

    pub async fn find_club_by_admin(&self, address: &str) -> anyhow::Result<Option<Club>> {
        Ok(
            sqlx::query_as("select * from clubs where admin_contact = ? limit 1")
                .bind(address)
                .fetch_optional(&self.db)
                .await?,
        )
    }

    /// Resolves a contact to the club of its oldest profile.
    pub async fn find_club_for_contact(&self, address: &str) -> anyhow::Result<Option<Club>> {
        Ok(sqlx::query_as(
            "select c.* from clubs c
                        inner join players p on p.club_id = c.id
                        inner join contacts w on w.id = p.contact_id
                        where w.address = ?
                        order by p.id asc
                        limit 1",
        )
        .bind(address)
        .fetch_optional(&self.db)
        .await?)
    }

    pub async fn find_or_create_contact(&self, address: &str) -> anyhow::Result<Contact> {
        if let Some(contact) =
            sqlx::query_as::<_, Contact>("select * from contacts where address = ? limit 1")
                .bind(address)
                .fetch_optional(&self.db)
                .await?
        {
            return Ok(contact);
        }

        log::debug!("First contact from {}", address);
        let created_at = unix_now();
        let id = sqlx::query("insert into contacts(address, created_at) values(?, ?)")
            .bind(address)
            .bind(created_at)
            .execute(&self.db)
            .await?
            .last_insert_rowid();

        Ok(Contact {
            id,
            address: address.to_string(),
            created_at,
        })
    }

    pub async fn add_player(
        &self,
        club_id: i64,
        name: &str,
        category: Option<&str>,
        contact_id: i64,
    ) -> anyhow::Result<Player> {
        log::debug!("Creating player {} in club {}", name, club_id);
        let id = sqlx::query(
            "insert into players(name, rating, category, contact_id, club_id)
                        values(?, ?, ?, ?, ?)",
        )
        .bind(name)
        .bind(INITIAL_RATING)
        .bind(category.unwrap_or(DEFAULT_CATEGORY))
        .bind(contact_id)
        .bind(club_id)
        .execute(&self.db)
        .await?
        .last_insert_rowid();

        self.get_player(id).await
    }

    pub async fn get_player(&self, player_id: i64) -> anyhow::Result<Player> {
        sqlx::query_as("select * from players where id = ? limit 1")
            .bind(player_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or(anyhow!("Failed to find player {}", player_id))
    }

    pub async fn find_player(&self, club_id: i64, name: &str) -> anyhow::Result<Option<Player>> {
        Ok(
            sqlx::query_as("select * from players where club_id = ? and name = ? limit 1")
                .bind(club_id)
                .bind(name)
                .fetch_optional(&self.db)
                .await?,
        )
    }

    /// Club players ranked by rating, ties broken by id for stable output.
    pub async fn list_players(&self, club_id: i64) -> anyhow::Result<Vec<Player>> {
        Ok(sqlx::query_as(
            "select * from players where club_id = ?
                        order by rating desc, id asc",
        )
        .bind(club_id)
        .fetch_all(&self.db)
        .await?)
    }

    pub async fn top_players(&self, club_id: i64, count: u32) -> anyhow::Result<Vec<Player>> {
        Ok(sqlx::query_as(
            "select * from players where club_id = ?
                        order by rating desc, id asc limit ?",
        )
        .bind(club_id)
        .bind(count)
        .fetch_all(&self.db)
        .await?)
    }

    pub async fn players_by_ids(&self, club_id: i64, ids: &[i64]) -> anyhow::Result<Vec<Player>> {
        let mut players = self.list_players(club_id).await?;
        players.retain(|p| ids.contains(&p.id));
        Ok(players)
    }

    /// Opens a new tournament in enrollment and, in the same transaction,
    /// finishes every other non-finished tournament of the club. At most
    /// one tournament per club is ever live.
    pub async fn create_tournament(
        &self,
        club_id: i64,
        name: &str,
        category: Option<&str>,
    ) -> anyhow::Result<Tournament> {
        log::info!("Creating tournament {} for club {}", name, club_id);
        let mut tx = self.db.begin().await?;

        sqlx::query("update tournaments set status = ? where club_id = ? and status != ?")
            .bind(TournamentStatus::Finished)
            .bind(club_id)
            .bind(TournamentStatus::Finished)
            .execute(&mut *tx)
            .await?;

        let meta = serde_json::to_string(&TournamentMeta::default())?;
        let id = sqlx::query(
            "insert into tournaments(name, category, status, meta, meta_version, club_id)
                        values(?, ?, ?, ?, 0, ?)",
        )
        .bind(name)
        .bind(category.unwrap_or(DEFAULT_CATEGORY))
        .bind(TournamentStatus::Enrollment)
        .bind(meta)
        .bind(club_id)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        tx.commit().await?;
        self.get_tournament(id).await
    }

    pub async fn get_tournament(&self, tournament_id: i64) -> anyhow::Result<Tournament> {
        sqlx::query_as("select * from tournaments where id = ? limit 1")
            .bind(tournament_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or(anyhow!("Failed to find tournament {}", tournament_id))
    }

    /// The club's tournament still accepting sign-ups, if any.
    pub async fn open_tournament(&self, club_id: i64) -> anyhow::Result<Option<Tournament>> {
        Ok(
            sqlx::query_as("select * from tournaments where club_id = ? and status = ? limit 1")
                .bind(club_id)
                .bind(TournamentStatus::Enrollment)
                .fetch_optional(&self.db)
                .await?,
        )
    }

    /// The club's non-finished tournament, whether enrolling or live.
    pub async fn active_tournament(&self, club_id: i64) -> anyhow::Result<Option<Tournament>> {
        Ok(
            sqlx::query_as("select * from tournaments where club_id = ? and status != ? limit 1")
                .bind(club_id)
                .bind(TournamentStatus::Finished)
                .fetch_optional(&self.db)
                .await?,
        )
    }

    /// Adds a player to the enrollment list under optimistic concurrency:
    /// the whole metadata value is rewritten only if its version has not
    /// moved since the read, otherwise the merge is retried.
    pub async fn enroll_player(
        &self,
        tournament_id: i64,
        player_id: i64,
    ) -> anyhow::Result<EnrollOutcome> {
        for _ in 0..ENROLL_RETRIES {
            let row: Option<(String, i64)> = sqlx::query_as(
                "select meta, meta_version from tournaments
                            where id = ? and status = ?",
            )
            .bind(tournament_id)
            .bind(TournamentStatus::Enrollment)
            .fetch_optional(&self.db)
            .await?;

            let Some((raw_meta, version)) = row else {
                return Err(ClubError::NoOpenTournament.into());
            };

            let mut meta: TournamentMeta = serde_json::from_str(&raw_meta).unwrap_or_default();
            if meta.enrolled.contains(&player_id) {
                return Ok(EnrollOutcome::AlreadyEnrolled);
            }
            meta.enrolled.push(player_id);

            if self
                .commit_enrollment(tournament_id, &meta, version)
                .await?
            {
                return Ok(EnrollOutcome::Enrolled);
            }
            log::debug!(
                "Enrollment raced on tournament {}, retrying merge",
                tournament_id
            );
        }

        Err(ClubError::EnrollmentContention(tournament_id).into())
    }

    /// The enrollment write: commits only if the metadata version has not
    /// moved since the read and the tournament is still enrolling. A
    /// bracket may go out between the read and this write, so the status
    /// is re-checked here, not just at the read.
    async fn commit_enrollment(
        &self,
        tournament_id: i64,
        meta: &TournamentMeta,
        version: i64,
    ) -> anyhow::Result<bool> {
        let updated = sqlx::query(
            "update tournaments set meta = ?, meta_version = meta_version + 1
                        where id = ? and meta_version = ? and status = ?",
        )
        .bind(serde_json::to_string(meta)?)
        .bind(tournament_id)
        .bind(version)
        .bind(TournamentStatus::Enrollment)
        .execute(&self.db)
        .await?;

        Ok(updated.rows_affected() == 1)
    }

    /// Persists a generated bracket as one batch of unplayed matches and
    /// moves the tournament out of enrollment, all in one transaction.
    pub async fn record_bracket(
        &self,
        tournament_id: i64,
        pairs: &[(i64, i64)],
    ) -> anyhow::Result<()> {
        let mut tx = self.db.begin().await?;

        for (one, two) in pairs {
            sqlx::query(
                "insert into matches(player_one, player_two, score, played_at, finished, tournament_id)
                            values(?, ?, ?, ?, ?, ?)",
            )
            .bind(one)
            .bind(two)
            .bind(UNPLAYED_SCORE)
            .bind(unix_now())
            .bind(false)
            .bind(tournament_id)
            .execute(&mut *tx)
            .await?;
        }

        let updated = sqlx::query("update tournaments set status = ? where id = ? and status = ?")
            .bind(TournamentStatus::InProgress)
            .bind(tournament_id)
            .bind(TournamentStatus::Enrollment)
            .execute(&mut *tx)
            .await?;

        if updated.rows_affected() != 1 {
            return Err(ClubError::NoOpenTournament.into());
        }

        tx.commit().await?;
        Ok(())
    }

    /// Applies a reported result: both ratings, both counters, and the
    /// match record move together or not at all.
    pub async fn record_result(
        &self,
        winner: &Player,
        loser: &Player,
        score: &str,
        change: &RatingChange,
    ) -> anyhow::Result<()> {
        let mut tx = self.db.begin().await?;

        sqlx::query("update players set rating = ?, wins = wins + 1 where id = ?")
            .bind(change.winner)
            .bind(winner.id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("update players set rating = ?, losses = losses + 1 where id = ?")
            .bind(change.loser)
            .bind(loser.id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "insert into matches(player_one, player_two, winner, score, played_at, finished)
                        values(?, ?, ?, ?, ?, ?)",
        )
        .bind(winner.id)
        .bind(loser.id)
        .bind(winner.id)
        .bind(score)
        .bind(unix_now())
        .bind(true)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn matches_for_tournament(&self, tournament_id: i64) -> anyhow::Result<Vec<Match>> {
        Ok(
            sqlx::query_as("select * from matches where tournament_id = ? order by id asc")
                .bind(tournament_id)
                .fetch_all(&self.db)
                .await?,
        )
    }
}
