// Prospects, accounts and contacts.

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};

use super::{enum_column, new_id, Database, StoreError};
use crate::models::{Account, Contact, NewAccount, NewContact, NewProspect, Prospect, Upserted};

const PROSPECT_COLUMNS: &str =
    "id, user_id, name, email, title, company, domain, linkedin_url, added_at";

fn prospect_from_row(row: &Row<'_>) -> rusqlite::Result<Prospect> {
    Ok(Prospect {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        email: row.get(3)?,
        title: row.get(4)?,
        company: row.get(5)?,
        domain: row.get(6)?,
        linkedin_url: row.get(7)?,
        added_at: row.get(8)?,
    })
}

const ACCOUNT_COLUMNS: &str = "id, user_id, name, domain, industry, employee_count, created_at";

fn account_from_row(row: &Row<'_>) -> rusqlite::Result<Account> {
    Ok(Account {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        domain: row.get(3)?,
        industry: row.get(4)?,
        employee_count: row.get(5)?,
        created_at: row.get(6)?,
    })
}

const CONTACT_COLUMNS: &str = "id, account_id, name, email, title, linkedin_url, source, created_at";

fn contact_from_row(row: &Row<'_>) -> rusqlite::Result<Contact> {
    let source: String = row.get(6)?;
    Ok(Contact {
        id: row.get(0)?,
        account_id: row.get(1)?,
        name: row.get(2)?,
        email: row.get(3)?,
        title: row.get(4)?,
        linkedin_url: row.get(5)?,
        source: enum_column(6, &source)?,
        created_at: row.get(7)?,
    })
}

/// Trim a free-text field and drop it when blank.
fn clean(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl Database {
    // ------------------------------------------------------------------
    // Prospects
    // ------------------------------------------------------------------

    /// Add a prospect for `user_id`. If the user already has a prospect with
    /// the same email and company (case-insensitive), that row is returned
    /// unchanged as [`Upserted::Existing`].
    pub fn add_prospect(&self, user_id: &str, new: &NewProspect) -> Result<Upserted<Prospect>> {
        let mut conn = self.conn();
        let tx = conn
            .transaction()
            .context("failed to begin prospect transaction")?;

        let email = new.email.trim().to_lowercase();
        let company = new.company.trim().to_string();

        let existing = tx
            .query_row(
                &format!(
                    "SELECT {PROSPECT_COLUMNS} FROM prospects
                     WHERE user_id = ?1 AND lower(email) = ?2 AND lower(company) = lower(?3)"
                ),
                params![user_id, email, company],
                prospect_from_row,
            )
            .optional()
            .context("failed to check for duplicate prospect")?;
        if let Some(prospect) = existing {
            return Ok(Upserted::Existing(prospect));
        }

        let prospect = Prospect {
            id: new_id(),
            user_id: user_id.to_string(),
            name: new.name.trim().to_string(),
            email,
            title: clean(&new.title),
            company,
            domain: clean(&new.domain),
            linkedin_url: clean(&new.linkedin_url),
            added_at: Utc::now(),
        };
        tx.execute(
            "INSERT INTO prospects (id, user_id, name, email, title, company, domain, linkedin_url, added_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                prospect.id,
                prospect.user_id,
                prospect.name,
                prospect.email,
                prospect.title,
                prospect.company,
                prospect.domain,
                prospect.linkedin_url,
                prospect.added_at,
            ],
        )
        .context("failed to insert prospect")?;
        tx.commit().context("failed to commit prospect")?;
        Ok(Upserted::Inserted(prospect))
    }

    /// Prospects owned by `user_id`, newest first.
    pub fn list_prospects(&self, user_id: &str) -> Result<Vec<Prospect>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {PROSPECT_COLUMNS} FROM prospects WHERE user_id = ?1
                 ORDER BY added_at DESC"
            ))
            .context("failed to prepare list_prospects query")?;
        let rows = stmt
            .query_map(params![user_id], prospect_from_row)
            .context("failed to query prospects")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map prospect rows")?;
        Ok(rows)
    }

    /// Load a prospect, scoped to its owner.
    pub fn prospect_for_user(&self, user_id: &str, prospect_id: &str) -> Result<Option<Prospect>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {PROSPECT_COLUMNS} FROM prospects WHERE id = ?1 AND user_id = ?2"),
            params![prospect_id, user_id],
            prospect_from_row,
        )
        .optional()
        .context("failed to load prospect")
    }

    pub fn delete_prospect(&self, user_id: &str, prospect_id: &str) -> Result<()> {
        let conn = self.conn();
        let n = conn
            .execute(
                "DELETE FROM prospects WHERE id = ?1 AND user_id = ?2",
                params![prospect_id, user_id],
            )
            .context("failed to delete prospect")?;
        if n == 0 {
            return Err(StoreError::NotFound {
                entity: "prospect",
                id: prospect_id.to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Distinct company names a user is prospecting. `None` means every user.
    pub fn prospect_companies(&self, user_id: Option<&str>) -> Result<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT company FROM prospects
                 WHERE (?1 IS NULL OR user_id = ?1)
                 GROUP BY lower(company) ORDER BY lower(company)",
            )
            .context("failed to prepare prospect_companies query")?;
        let rows = stmt
            .query_map(params![user_id], |row| row.get(0))
            .context("failed to query prospect companies")?
            .collect::<std::result::Result<Vec<String>, _>>()
            .context("failed to map company rows")?;
        Ok(rows)
    }

    // ------------------------------------------------------------------
    // Accounts
    // ------------------------------------------------------------------

    /// Insert an account or fill in blank fields on an existing one with the
    /// same name (case-insensitive).
    pub fn upsert_account(&self, user_id: &str, new: &NewAccount) -> Result<Upserted<Account>> {
        let mut conn = self.conn();
        let tx = conn
            .transaction()
            .context("failed to begin account transaction")?;
        let name = new.name.trim().to_string();

        let existing = tx
            .query_row(
                &format!(
                    "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE user_id = ?1 AND lower(name) = lower(?2)"
                ),
                params![user_id, name],
                account_from_row,
            )
            .optional()
            .context("failed to look up account")?;

        let result = match existing {
            Some(mut account) => {
                account.domain = account.domain.or_else(|| clean(&new.domain));
                account.industry = account.industry.or_else(|| clean(&new.industry));
                account.employee_count = account.employee_count.or(new.employee_count);
                tx.execute(
                    "UPDATE accounts SET domain = ?2, industry = ?3, employee_count = ?4 WHERE id = ?1",
                    params![
                        account.id,
                        account.domain,
                        account.industry,
                        account.employee_count
                    ],
                )
                .context("failed to update account")?;
                Upserted::Existing(account)
            }
            None => {
                let account = Account {
                    id: new_id(),
                    user_id: user_id.to_string(),
                    name,
                    domain: clean(&new.domain),
                    industry: clean(&new.industry),
                    employee_count: new.employee_count,
                    created_at: Utc::now(),
                };
                tx.execute(
                    "INSERT INTO accounts (id, user_id, name, domain, industry, employee_count, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        account.id,
                        account.user_id,
                        account.name,
                        account.domain,
                        account.industry,
                        account.employee_count,
                        account.created_at,
                    ],
                )
                .context("failed to insert account")?;
                Upserted::Inserted(account)
            }
        };
        tx.commit().context("failed to commit account")?;
        Ok(result)
    }

    pub fn list_accounts(&self, user_id: &str) -> Result<Vec<Account>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE user_id = ?1 ORDER BY lower(name)"
            ))
            .context("failed to prepare list_accounts query")?;
        let rows = stmt
            .query_map(params![user_id], account_from_row)
            .context("failed to query accounts")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map account rows")?;
        Ok(rows)
    }

    pub fn account_for_user(&self, user_id: &str, account_id: &str) -> Result<Option<Account>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?1 AND user_id = ?2"),
            params![account_id, user_id],
            account_from_row,
        )
        .optional()
        .context("failed to load account")
    }

    pub fn account_by_name(&self, user_id: &str, name: &str) -> Result<Option<Account>> {
        let conn = self.conn();
        conn.query_row(
            &format!(
                "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE user_id = ?1 AND lower(name) = lower(?2)"
            ),
            params![user_id, name.trim()],
            account_from_row,
        )
        .optional()
        .context("failed to load account by name")
    }

    // ------------------------------------------------------------------
    // Contacts
    // ------------------------------------------------------------------

    /// Add a contact to an account. A contact whose email already exists on
    /// the account is returned as [`Upserted::Existing`].
    pub fn add_contact(&self, account_id: &str, new: &NewContact) -> Result<Upserted<Contact>> {
        let mut conn = self.conn();
        let tx = conn
            .transaction()
            .context("failed to begin contact transaction")?;
        let email = clean(&new.email).map(|e| e.to_lowercase());

        if let Some(email) = &email {
            let existing = tx
                .query_row(
                    &format!(
                        "SELECT {CONTACT_COLUMNS} FROM contacts WHERE account_id = ?1 AND lower(email) = ?2"
                    ),
                    params![account_id, email],
                    contact_from_row,
                )
                .optional()
                .context("failed to check for duplicate contact")?;
            if let Some(contact) = existing {
                return Ok(Upserted::Existing(contact));
            }
        }

        let contact = Contact {
            id: new_id(),
            account_id: account_id.to_string(),
            name: new.name.trim().to_string(),
            email,
            title: clean(&new.title),
            linkedin_url: clean(&new.linkedin_url),
            source: new.source,
            created_at: Utc::now(),
        };
        tx.execute(
            "INSERT INTO contacts (id, account_id, name, email, title, linkedin_url, source, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                contact.id,
                contact.account_id,
                contact.name,
                contact.email,
                contact.title,
                contact.linkedin_url,
                contact.source.as_str(),
                contact.created_at,
            ],
        )
        .context("failed to insert contact")?;
        tx.commit().context("failed to commit contact")?;
        Ok(Upserted::Inserted(contact))
    }

    pub fn list_contacts(&self, account_id: &str) -> Result<Vec<Contact>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {CONTACT_COLUMNS} FROM contacts WHERE account_id = ?1 ORDER BY created_at"
            ))
            .context("failed to prepare list_contacts query")?;
        let rows = stmt
            .query_map(params![account_id], contact_from_row)
            .context("failed to query contacts")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map contact rows")?;
        Ok(rows)
    }
}
