use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(AuthUser::Table)
                    .if_not_exists()
                    .col(pk_auto(AuthUser::Id))
                    .col(string_len_uniq(AuthUser::Username, 150))
                    .col(string(AuthUser::Password))
                    .col(big_integer(AuthUser::DateJoined))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(AuthToken::Table)
                    .if_not_exists()
                    .col(string_len(AuthToken::Key, 40).primary_key())
                    .col(integer_uniq(AuthToken::UserId))
                    .col(big_integer(AuthToken::Created))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_auth_token_user")
                            .from(AuthToken::Table, AuthToken::UserId)
                            .to(AuthUser::Table, AuthUser::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(AuthToken::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(AuthUser::Table).to_owned()).await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum AuthUser {
    Table,
    Id,
    Username,
    Password,
    DateJoined,
}

#[derive(DeriveIden)]
enum AuthToken {
    Table,
    Key,
    UserId,
    Created,
}
