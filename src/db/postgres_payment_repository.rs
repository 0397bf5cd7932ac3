use crate::db::payment_repository::{PaymentRepository, RecordOutcome};
use crate::db::postgres_subscription_repository::upsert_subscription_on;
use crate::models::{
    media_purchase::NewMediaPurchase,
    message::{Message, NewMessagePayment},
    payment::{NewPayment, Payment, PaymentProvider, PaymentStatus},
    subscription::SubscriptionUpsert,
};
use async_trait::async_trait;
use sqlx::{PgConnection, PgPool};
use time::OffsetDateTime;
use tracing::debug;

pub struct PostgresPaymentRepository {
    pub pool: PgPool,
}

/// Conditional ledger insert keyed by `(provider, provider_transaction_id)`.
/// Returns `None` when the transaction id was already recorded.
async fn insert_payment(
    conn: &mut PgConnection,
    payment: NewPayment,
) -> Result<Option<Payment>, sqlx::Error> {
    let row = payment.into_payment(OffsetDateTime::now_utc());
    let inserted = sqlx::query(
        r#"
        INSERT INTO payments (
            id,
            user_id,
            amount_minor,
            currency,
            status,
            provider,
            provider_transaction_id,
            payment_type,
            metadata,
            created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ON CONFLICT (provider, provider_transaction_id) DO NOTHING
        "#,
    )
    .bind(&row.id)
    .bind(&row.user_id)
    .bind(row.amount_minor)
    .bind(&row.currency)
    .bind(row.status)
    .bind(row.provider)
    .bind(&row.provider_transaction_id)
    .bind(row.payment_type)
    .bind(&row.metadata)
    .bind(row.created_at)
    .execute(conn)
    .await?
    .rows_affected();

    if inserted == 0 {
        debug!(
            provider = %row.provider,
            provider_transaction_id = %row.provider_transaction_id,
            "payment already recorded"
        );
        return Ok(None);
    }
    Ok(Some(row))
}

async fn insert_message_payment(
    conn: &mut PgConnection,
    payment: NewMessagePayment,
) -> Result<(), sqlx::Error> {
    let row = payment.into_message_payment(OffsetDateTime::now_utc());
    sqlx::query(
        r#"
        INSERT INTO message_payments (
            id,
            message_id,
            user_id,
            payment_type,
            amount_minor,
            currency,
            status,
            provider,
            created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(&row.id)
    .bind(&row.message_id)
    .bind(&row.user_id)
    .bind(row.payment_type)
    .bind(row.amount_minor)
    .bind(&row.currency)
    .bind(row.status)
    .bind(row.provider)
    .bind(row.created_at)
    .execute(conn)
    .await?;
    Ok(())
}

#[async_trait]
impl PaymentRepository for PostgresPaymentRepository {
    async fn find_message(&self, message_id: &str) -> Result<Option<Message>, sqlx::Error> {
        sqlx::query_as::<_, Message>(
            "SELECT id, sender_id, unlocked_by, tip_total_minor FROM messages WHERE id = $1",
        )
        .bind(message_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn record_payment(&self, payment: NewPayment) -> Result<RecordOutcome, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        Ok(match insert_payment(&mut conn, payment).await? {
            Some(row) => RecordOutcome::Recorded(row),
            None => RecordOutcome::Duplicate,
        })
    }

    async fn record_media_purchase(
        &self,
        purchase: NewMediaPurchase,
        payment: NewPayment,
    ) -> Result<RecordOutcome, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let Some(row) = insert_payment(&mut tx, payment).await? else {
            tx.rollback().await?;
            return Ok(RecordOutcome::Duplicate);
        };

        let purchase = purchase.into_purchase(row.created_at);
        sqlx::query(
            r#"
            INSERT INTO media_purchases (
                id,
                user_id,
                media_id,
                amount_minor,
                currency,
                provider,
                provider_transaction_id,
                status,
                created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (provider, provider_transaction_id) DO NOTHING
            "#,
        )
        .bind(&purchase.id)
        .bind(&purchase.user_id)
        .bind(&purchase.media_id)
        .bind(purchase.amount_minor)
        .bind(&purchase.currency)
        .bind(purchase.provider)
        .bind(&purchase.provider_transaction_id)
        .bind(purchase.status)
        .bind(purchase.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(RecordOutcome::Recorded(row))
    }

    async fn record_ppv_unlock(
        &self,
        unlock: NewMessagePayment,
        payment: NewPayment,
    ) -> Result<RecordOutcome, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let Some(row) = insert_payment(&mut tx, payment).await? else {
            tx.rollback().await?;
            return Ok(RecordOutcome::Duplicate);
        };

        // Add-to-set in one statement; no read-modify-write window.
        sqlx::query(
            r#"
            UPDATE messages
            SET unlocked_by = unlocked_by || jsonb_build_array($2::text)
            WHERE id = $1
              AND NOT (unlocked_by ? $2)
            "#,
        )
        .bind(&unlock.message_id)
        .bind(&unlock.user_id)
        .execute(&mut *tx)
        .await?;

        insert_message_payment(&mut tx, unlock).await?;

        tx.commit().await?;
        Ok(RecordOutcome::Recorded(row))
    }

    async fn record_tip(
        &self,
        tip: Option<NewMessagePayment>,
        payment: NewPayment,
    ) -> Result<RecordOutcome, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let Some(row) = insert_payment(&mut tx, payment).await? else {
            tx.rollback().await?;
            return Ok(RecordOutcome::Duplicate);
        };

        if let Some(tip) = tip {
            sqlx::query(
                "UPDATE messages SET tip_total_minor = tip_total_minor + $2 WHERE id = $1",
            )
            .bind(&tip.message_id)
            .bind(tip.amount.minor)
            .execute(&mut *tx)
            .await?;

            insert_message_payment(&mut tx, tip).await?;
        }

        tx.commit().await?;
        Ok(RecordOutcome::Recorded(row))
    }

    async fn record_subscription_purchase(
        &self,
        subscription: SubscriptionUpsert,
        payment: NewPayment,
    ) -> Result<RecordOutcome, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let Some(row) = insert_payment(&mut tx, payment).await? else {
            tx.rollback().await?;
            return Ok(RecordOutcome::Duplicate);
        };

        upsert_subscription_on(&mut tx, &subscription).await?;

        tx.commit().await?;
        Ok(RecordOutcome::Recorded(row))
    }

    async fn update_payment_status(
        &self,
        provider: PaymentProvider,
        provider_transaction_id: &str,
        status: PaymentStatus,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = $3
            WHERE provider = $1
              AND provider_transaction_id = $2
              AND status::text = ANY($4)
            "#,
        )
        .bind(provider)
        .bind(provider_transaction_id)
        .bind(status)
        .bind(
            status
                .reachable_from()
                .iter()
                .map(PaymentStatus::as_str)
                .collect::<Vec<_>>(),
        )
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
