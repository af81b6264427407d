//! Customer business logic - Creating, updating and looking up customers.
//!
//! Emails are unique. A duplicate is rejected up front with an integrity violation;
//! the unique column constraint backs this up for concurrent writers.

use crate::{
    entities::{Customer, customer},
    errors::{Error, Result},
};
use sea_orm::{PaginatorTrait, Set, prelude::*};
use tracing::debug;

/// Input for [`create_customer`].
#[derive(Debug, Clone)]
pub struct NewCustomer {
    /// Given name
    pub first_name: String,
    /// Family name
    pub last_name: String,
    /// Contact email, must be unique
    pub email: String,
    /// Country of residence
    pub country: Option<String>,
    /// City of residence
    pub city: Option<String>,
}

/// Field changes for [`update_customer`]; `None` leaves a field as it is.
#[derive(Debug, Clone, Default)]
pub struct CustomerChanges {
    /// New given name
    pub first_name: Option<String>,
    /// New family name
    pub last_name: Option<String>,
    /// New email, must stay unique
    pub email: Option<String>,
    /// New country
    pub country: Option<String>,
    /// New city
    pub city: Option<String>,
}

fn required(field: &str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::integrity(format!("customer {field} cannot be empty")));
    }
    Ok(trimmed.to_string())
}

fn normalize_email(email: &str) -> Result<String> {
    let email = required("email", email)?.to_lowercase();
    if !email.contains('@') {
        return Err(Error::integrity(format!("invalid email address '{email}'")));
    }
    Ok(email)
}

async fn ensure_email_free<C>(db: &C, email: &str, except_id: Option<i64>) -> Result<()>
where
    C: ConnectionTrait,
{
    if let Some(existing) = get_customer_by_email(db, email).await? {
        if Some(existing.id) != except_id {
            return Err(Error::integrity(format!("email '{email}' is already taken")));
        }
    }
    Ok(())
}

/// Creates a customer after validating names and email uniqueness.
///
/// # Errors
/// Returns `Error::IntegrityViolation` if a name or the email is empty, the email is
/// malformed, or another customer already uses it.
pub async fn create_customer<C>(db: &C, new: NewCustomer) -> Result<customer::Model>
where
    C: ConnectionTrait,
{
    let first_name = required("first name", &new.first_name)?;
    let last_name = required("last name", &new.last_name)?;
    let email = normalize_email(&new.email)?;
    ensure_email_free(db, &email, None).await?;

    let now = chrono::Utc::now().naive_utc();
    let customer = customer::ActiveModel {
        first_name: Set(first_name),
        last_name: Set(last_name),
        email: Set(email),
        country: Set(new.country),
        city: Set(new.city),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };
    let model = customer.insert(db).await?;
    debug!("Created customer {} <{}>", model.id, model.email);
    Ok(model)
}

/// Applies `changes` to an existing customer. `updated_at` is bumped by the entity hook.
pub async fn update_customer<C>(
    db: &C,
    customer_id: i64,
    changes: CustomerChanges,
) -> Result<customer::Model>
where
    C: ConnectionTrait,
{
    let mut active: customer::ActiveModel = get_customer_by_id(db, customer_id)
        .await?
        .ok_or(Error::NotFound {
            entity: "customer",
            id: customer_id,
        })?
        .into();

    if let Some(first_name) = changes.first_name {
        active.first_name = Set(required("first name", &first_name)?);
    }
    if let Some(last_name) = changes.last_name {
        active.last_name = Set(required("last name", &last_name)?);
    }
    if let Some(email) = changes.email {
        let email = normalize_email(&email)?;
        ensure_email_free(db, &email, Some(customer_id)).await?;
        active.email = Set(email);
    }
    if let Some(country) = changes.country {
        active.country = Set(Some(country));
    }
    if let Some(city) = changes.city {
        active.city = Set(Some(city));
    }

    active.update(db).await.map_err(Into::into)
}

/// Retrieves a customer by ID.
pub async fn get_customer_by_id<C>(db: &C, customer_id: i64) -> Result<Option<customer::Model>>
where
    C: ConnectionTrait,
{
    Customer::find_by_id(customer_id)
        .one(db)
        .await
        .map_err(Into::into)
}

/// Retrieves a customer by email (case-insensitive, as emails are stored lowercased).
pub async fn get_customer_by_email<C>(db: &C, email: &str) -> Result<Option<customer::Model>>
where
    C: ConnectionTrait,
{
    Customer::find()
        .filter(customer::Column::Email.eq(email.trim().to_lowercase()))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Number of customers in the store.
pub async fn count_customers<C>(db: &C) -> Result<u64>
where
    C: ConnectionTrait,
{
    Customer::find().count(db).await.map_err(Into::into)
}
