use crate::error::StagehandResult;
use sqlx::PgConnection;

pub mod admin;
pub mod convention;
pub mod student;

pub trait DataType: Sized {
    type Id;
    type FormForAdding;

    async fn get_from_db_by_id(id: Self::Id, conn: &mut PgConnection) -> StagehandResult<Option<Self>>;
    async fn get_all(conn: &mut PgConnection) -> StagehandResult<Vec<Self>>;
    async fn insert_into_database(
        to_be_added: Self::FormForAdding,
        conn: &mut PgConnection,
    ) -> StagehandResult<Self::Id>;
    async fn remove_from_database(id: Self::Id, conn: &mut PgConnection) -> StagehandResult<()>;
}
