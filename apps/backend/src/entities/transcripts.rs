use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "transcripts")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(column_name = "encounter_id")]
    pub encounter_id: i32,
    #[sea_orm(column_type = "Text")]
    pub content: String,
    /// Recording file the text was produced from, relative to `RECORDINGS_FOLDER`.
    #[sea_orm(column_name = "audio_path")]
    pub audio_path: Option<String>,
    #[sea_orm(column_name = "created_at")]
    pub created_at: OffsetDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::encounters::Entity",
        from = "Column::EncounterId",
        to = "super::encounters::Column::Id",
        on_delete = "Cascade"
    )]
    Encounter,
}

impl Related<super::encounters::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Encounter.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
