use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use preorder_core::{
    ActivityLog, ActivityLogEntry, OrderFilter, Shop, SplitPaymentConfig, SplitPaymentOrder,
    SplitPaymentStatus, SplitPaymentStore,
};
use sqlx::{PgPool, Row, postgres::PgPoolOptions, postgres::PgRow};
use uuid::Uuid;

const ORDER_COLUMNS: &str = r#"
    id, shop_id, customer_email, customer_name, product_id, variant_id, product_title,
    variant_title, quantity, unit_price, currency, total_amount, deposit_percentage,
    deposit_amount, remaining_amount, deposit_order_ref, remaining_order_ref,
    deposit_paid_order_id, remaining_paid_order_id, deposit_paid, remaining_paid,
    deposit_refunded, remaining_refunded, deposit_paid_at, remaining_paid_at,
    remaining_invoice_sent_at, due_date, status, notes, tags, created_at, updated_at
"#;

pub async fn connect_database(database_url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;

    Ok(pool)
}

/// Postgres-backed record store. Schema lives in `migrations/`.
#[derive(Clone)]
pub struct PgSplitPaymentStore {
    pool: PgPool,
}

impl PgSplitPaymentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl SplitPaymentStore for PgSplitPaymentStore {
    async fn get_shop(&self, shop_id: &str) -> Result<Option<Shop>> {
        let row = sqlx::query("SELECT shop_id, shop_domain, access_token FROM shops WHERE shop_id = $1")
            .bind(shop_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(shop_from_row).transpose()
    }

    async fn find_shop_by_domain(&self, shop_domain: &str) -> Result<Option<Shop>> {
        let row = sqlx::query(
            "SELECT shop_id, shop_domain, access_token FROM shops WHERE lower(shop_domain) = lower($1)",
        )
        .bind(shop_domain.trim())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(shop_from_row).transpose()
    }

    async fn upsert_shop(&self, shop: Shop) -> Result<Shop> {
        sqlx::query(
            r#"
            INSERT INTO shops (shop_id, shop_domain, access_token, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $4)
            ON CONFLICT (shop_id) DO UPDATE
            SET shop_domain = EXCLUDED.shop_domain,
                access_token = EXCLUDED.access_token,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&shop.shop_id)
        .bind(&shop.shop_domain)
        .bind(&shop.access_token)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(shop)
    }

    async fn get_config(&self, shop_id: &str) -> Result<Option<SplitPaymentConfig>> {
        let row = sqlx::query(
            r#"
            SELECT shop_id, enabled, default_percentage, minimum_deposit, maximum_deposit,
                   payment_terms_days, auto_charge_remaining, send_payment_reminders,
                   reminder_days_before, late_fee_enabled, late_fee_percentage,
                   grace_period_days, updated_at
            FROM split_payment_configs
            WHERE shop_id = $1
            "#,
        )
        .bind(shop_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(SplitPaymentConfig {
            shop_id: row.try_get("shop_id")?,
            enabled: row.try_get("enabled")?,
            default_percentage: row.try_get("default_percentage")?,
            minimum_deposit: row.try_get("minimum_deposit")?,
            maximum_deposit: row.try_get("maximum_deposit")?,
            payment_terms_days: row.try_get("payment_terms_days")?,
            auto_charge_remaining: row.try_get("auto_charge_remaining")?,
            send_payment_reminders: row.try_get("send_payment_reminders")?,
            reminder_days_before: row.try_get("reminder_days_before")?,
            late_fee_enabled: row.try_get("late_fee_enabled")?,
            late_fee_percentage: row.try_get("late_fee_percentage")?,
            grace_period_days: row.try_get("grace_period_days")?,
            updated_at: row.try_get("updated_at")?,
        }))
    }

    async fn upsert_config(&self, mut config: SplitPaymentConfig) -> Result<SplitPaymentConfig> {
        config.updated_at = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO split_payment_configs (
                shop_id, enabled, default_percentage, minimum_deposit, maximum_deposit,
                payment_terms_days, auto_charge_remaining, send_payment_reminders,
                reminder_days_before, late_fee_enabled, late_fee_percentage,
                grace_period_days, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (shop_id) DO UPDATE
            SET enabled = EXCLUDED.enabled,
                default_percentage = EXCLUDED.default_percentage,
                minimum_deposit = EXCLUDED.minimum_deposit,
                maximum_deposit = EXCLUDED.maximum_deposit,
                payment_terms_days = EXCLUDED.payment_terms_days,
                auto_charge_remaining = EXCLUDED.auto_charge_remaining,
                send_payment_reminders = EXCLUDED.send_payment_reminders,
                reminder_days_before = EXCLUDED.reminder_days_before,
                late_fee_enabled = EXCLUDED.late_fee_enabled,
                late_fee_percentage = EXCLUDED.late_fee_percentage,
                grace_period_days = EXCLUDED.grace_period_days,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&config.shop_id)
        .bind(config.enabled)
        .bind(config.default_percentage)
        .bind(config.minimum_deposit)
        .bind(config.maximum_deposit)
        .bind(config.payment_terms_days)
        .bind(config.auto_charge_remaining)
        .bind(config.send_payment_reminders)
        .bind(&config.reminder_days_before)
        .bind(config.late_fee_enabled)
        .bind(config.late_fee_percentage)
        .bind(config.grace_period_days)
        .bind(config.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(config)
    }

    async fn insert_order(&self, order: SplitPaymentOrder) -> Result<SplitPaymentOrder> {
        let tags: Vec<String> = order.tags.iter().cloned().collect();

        sqlx::query(
            r#"
            INSERT INTO split_payment_orders (
                id, shop_id, customer_email, customer_name, product_id, variant_id,
                product_title, variant_title, quantity, unit_price, currency, total_amount,
                deposit_percentage, deposit_amount, remaining_amount, deposit_order_ref,
                remaining_order_ref, deposit_paid_order_id, remaining_paid_order_id,
                deposit_paid, remaining_paid, deposit_refunded, remaining_refunded,
                deposit_paid_at, remaining_paid_at, remaining_invoice_sent_at, due_date,
                status, notes, tags, created_at, updated_at
            )
            VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                $17, $18, $19, $20, $21, $22, $23, $24, $25, $26, $27, $28, $29, $30,
                $31, $32
            )
            "#,
        )
        .bind(order.id)
        .bind(&order.shop_id)
        .bind(&order.customer_email)
        .bind(&order.customer_name)
        .bind(&order.product_id)
        .bind(&order.variant_id)
        .bind(&order.product_title)
        .bind(&order.variant_title)
        .bind(order.quantity)
        .bind(order.unit_price)
        .bind(&order.currency)
        .bind(order.total_amount)
        .bind(order.deposit_percentage)
        .bind(order.deposit_amount)
        .bind(order.remaining_amount)
        .bind(&order.deposit_order_ref)
        .bind(&order.remaining_order_ref)
        .bind(&order.deposit_paid_order_id)
        .bind(&order.remaining_paid_order_id)
        .bind(order.deposit_paid)
        .bind(order.remaining_paid)
        .bind(order.deposit_refunded)
        .bind(order.remaining_refunded)
        .bind(order.deposit_paid_at)
        .bind(order.remaining_paid_at)
        .bind(order.remaining_invoice_sent_at)
        .bind(order.due_date)
        .bind(order.status.as_str())
        .bind(&order.notes)
        .bind(&tags)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to insert split payment order {}", order.id))?;

        Ok(order)
    }

    async fn update_order(&self, mut order: SplitPaymentOrder) -> Result<SplitPaymentOrder> {
        order.updated_at = Utc::now();
        let tags: Vec<String> = order.tags.iter().cloned().collect();

        let result = sqlx::query(
            r#"
            UPDATE split_payment_orders
            SET deposit_order_ref = $2,
                remaining_order_ref = $3,
                deposit_paid_order_id = $4,
                remaining_paid_order_id = $5,
                deposit_paid = $6,
                remaining_paid = $7,
                deposit_refunded = $8,
                remaining_refunded = $9,
                deposit_paid_at = $10,
                remaining_paid_at = $11,
                remaining_invoice_sent_at = $12,
                status = $13,
                notes = $14,
                tags = $15,
                updated_at = $16
            WHERE id = $1
            "#,
        )
        .bind(order.id)
        .bind(&order.deposit_order_ref)
        .bind(&order.remaining_order_ref)
        .bind(&order.deposit_paid_order_id)
        .bind(&order.remaining_paid_order_id)
        .bind(order.deposit_paid)
        .bind(order.remaining_paid)
        .bind(order.deposit_refunded)
        .bind(order.remaining_refunded)
        .bind(order.deposit_paid_at)
        .bind(order.remaining_paid_at)
        .bind(order.remaining_invoice_sent_at)
        .bind(order.status.as_str())
        .bind(&order.notes)
        .bind(&tags)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            anyhow::bail!("split payment order {} does not exist", order.id);
        }

        Ok(order)
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<SplitPaymentOrder>> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM split_payment_orders WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(order_from_row).transpose()
    }

    async fn find_order_by_ref(
        &self,
        shop_id: &str,
        order_ref: &str,
    ) -> Result<Option<SplitPaymentOrder>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {ORDER_COLUMNS}
            FROM split_payment_orders
            WHERE shop_id = $1 AND (deposit_order_ref = $2 OR remaining_order_ref = $2)
            LIMIT 1
            "#
        ))
        .bind(shop_id)
        .bind(order_ref)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(order_from_row).transpose()
    }

    async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<SplitPaymentOrder>> {
        // LIMIT NULL is LIMIT ALL.
        let limit = filter.row_limit();

        let rows = sqlx::query(&format!(
            r#"
            SELECT {ORDER_COLUMNS}
            FROM split_payment_orders
            WHERE ($1::TEXT IS NULL OR shop_id = $1)
              AND ($2::TEXT IS NULL OR status = $2)
              AND ($3::TEXT IS NULL OR lower(customer_email) = lower($3))
            ORDER BY created_at DESC
            LIMIT $4
            "#
        ))
        .bind(&filter.shop_id)
        .bind(filter.status.map(|status| status.as_str()))
        .bind(&filter.customer_email)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(order_from_row).collect()
    }
}

#[async_trait]
impl ActivityLog for PgSplitPaymentStore {
    async fn append(&self, entry: ActivityLogEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO activity_logs (id, shop_id, action, resource_id, details, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(entry.id)
        .bind(&entry.shop_id)
        .bind(&entry.action)
        .bind(&entry.resource_id)
        .bind(&entry.details)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn entries_for(&self, resource_id: &str) -> Result<Vec<ActivityLogEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, shop_id, action, resource_id, details, created_at
            FROM activity_logs
            WHERE resource_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(resource_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(ActivityLogEntry {
                    id: row.try_get("id")?,
                    shop_id: row.try_get("shop_id")?,
                    action: row.try_get("action")?,
                    resource_id: row.try_get("resource_id")?,
                    details: row.try_get("details")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }
}

fn shop_from_row(row: &PgRow) -> Result<Shop> {
    Ok(Shop {
        shop_id: row.try_get("shop_id")?,
        shop_domain: row.try_get("shop_domain")?,
        access_token: row.try_get("access_token")?,
    })
}

fn order_from_row(row: &PgRow) -> Result<SplitPaymentOrder> {
    let status_raw: String = row.try_get("status")?;
    let status: SplitPaymentStatus = status_raw.parse()?;
    let tags: Vec<String> = row.try_get("tags")?;

    Ok(SplitPaymentOrder {
        id: row.try_get("id")?,
        shop_id: row.try_get("shop_id")?,
        customer_email: row.try_get("customer_email")?,
        customer_name: row.try_get("customer_name")?,
        product_id: row.try_get("product_id")?,
        variant_id: row.try_get("variant_id")?,
        product_title: row.try_get("product_title")?,
        variant_title: row.try_get("variant_title")?,
        quantity: row.try_get("quantity")?,
        unit_price: row.try_get("unit_price")?,
        currency: row.try_get("currency")?,
        total_amount: row.try_get("total_amount")?,
        deposit_percentage: row.try_get("deposit_percentage")?,
        deposit_amount: row.try_get("deposit_amount")?,
        remaining_amount: row.try_get("remaining_amount")?,
        deposit_order_ref: row.try_get("deposit_order_ref")?,
        remaining_order_ref: row.try_get("remaining_order_ref")?,
        deposit_paid_order_id: row.try_get("deposit_paid_order_id")?,
        remaining_paid_order_id: row.try_get("remaining_paid_order_id")?,
        deposit_paid: row.try_get("deposit_paid")?,
        remaining_paid: row.try_get("remaining_paid")?,
        deposit_refunded: row.try_get("deposit_refunded")?,
        remaining_refunded: row.try_get("remaining_refunded")?,
        deposit_paid_at: row.try_get("deposit_paid_at")?,
        remaining_paid_at: row.try_get("remaining_paid_at")?,
        remaining_invoice_sent_at: row.try_get("remaining_invoice_sent_at")?,
        due_date: row.try_get("due_date")?,
        status,
        notes: row.try_get("notes")?,
        tags: tags.into_iter().collect(),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
