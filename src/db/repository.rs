//! Row-level persistence for programs and indications.
//!
//! Free functions over a borrowed `Connection`, so the same operations
//! work inside and outside a transaction (`Transaction` derefs to
//! `Connection`). The pipeline uses the find-or-create and insert
//! paths; the read/search/delete paths serve the catalog's listing
//! surface, which consumes the same schema.

use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};

use super::DatabaseError;
use crate::models::{Indication, Program, ProvenanceSource};

// ═══════════════════════════════════════════
// Programs
// ═══════════════════════════════════════════

/// Look up the program for a `(drug_name, set_id)` pair, creating it on
/// first sight. Concurrent identical calls are serialized only by the
/// unique index on `set_id`; the loser surfaces a retryable
/// [`DatabaseError::Conflict`].
pub fn find_or_create_program(
    conn: &Connection,
    drug_name: &str,
    set_id: &str,
) -> Result<Program, DatabaseError> {
    if let Some(program) = find_program(conn, drug_name, set_id)? {
        tracing::debug!(drug_name, set_id, id = program.id, "found existing program");
        return Ok(program);
    }

    tracing::info!(drug_name, set_id, "creating new program");
    conn.execute(
        "INSERT INTO programs (drug_name, set_id) VALUES (?1, ?2)",
        params![drug_name, set_id],
    )
    .map_err(|e| DatabaseError::from_insert(e, "program"))?;

    let id = conn.last_insert_rowid();
    get_program(conn, id)?.ok_or_else(|| {
        DatabaseError::Conflict(format!("program {id} vanished after insert"))
    })
}

pub fn find_program(
    conn: &Connection,
    drug_name: &str,
    set_id: &str,
) -> Result<Option<Program>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, drug_name, set_id, created_at FROM programs
             WHERE drug_name = ?1 AND set_id = ?2",
            params![drug_name, set_id],
            program_from_row,
        )
        .optional()?;
    Ok(row)
}

pub fn get_program(conn: &Connection, id: i64) -> Result<Option<Program>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, drug_name, set_id, created_at FROM programs WHERE id = ?1",
            params![id],
            program_from_row,
        )
        .optional()?;
    Ok(row)
}

pub fn get_program_by_set_id(
    conn: &Connection,
    set_id: &str,
) -> Result<Option<Program>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, drug_name, set_id, created_at FROM programs WHERE set_id = ?1",
            params![set_id],
            program_from_row,
        )
        .optional()?;
    Ok(row)
}

/// Delete a program; its indications go with it via the cascade.
pub fn delete_program(conn: &Connection, id: i64) -> Result<bool, DatabaseError> {
    let affected = conn.execute("DELETE FROM programs WHERE id = ?1", params![id])?;
    Ok(affected > 0)
}

/// Case-insensitive substring search across programs and their
/// indications, newest programs first.
pub fn search_programs(conn: &Connection, needle: &str) -> Result<Vec<Program>, DatabaseError> {
    let pattern = format!("%{}%", needle.to_lowercase());
    let mut stmt = conn.prepare(
        "SELECT DISTINCT p.id, p.drug_name, p.set_id, p.created_at
         FROM programs p
         LEFT JOIN indications i ON i.program_id = p.id
         WHERE lower(p.drug_name) LIKE ?1
            OR lower(p.set_id) LIKE ?1
            OR lower(i.title) LIKE ?1
            OR lower(i.description) LIKE ?1
            OR lower(ifnull(i.icd10_code, '')) LIKE ?1
            OR lower(ifnull(i.icd10_title, '')) LIKE ?1
         ORDER BY p.created_at DESC, p.id DESC",
    )?;

    let rows = stmt.query_map(params![pattern], program_from_row)?;
    let mut programs = Vec::new();
    for row in rows {
        programs.push(row?);
    }
    Ok(programs)
}

fn program_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Program> {
    Ok(Program {
        id: row.get(0)?,
        drug_name: row.get(1)?,
        set_id: row.get(2)?,
        created_at: parse_timestamp(&row.get::<_, String>(3)?),
    })
}

// ═══════════════════════════════════════════
// Indications
// ═══════════════════════════════════════════

/// Insert one resolved indication, returning its new row id.
/// Constraint hits (duplicate title within the program, bad source)
/// map to [`DatabaseError::Conflict`].
#[allow(clippy::too_many_arguments)]
pub fn insert_indication(
    conn: &Connection,
    program_id: i64,
    title: &str,
    description: &str,
    icd10_code: Option<&str>,
    icd10_title: Option<&str>,
    source: ProvenanceSource,
) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO indications (title, description, icd10_code, icd10_title, source, program_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            title,
            description,
            icd10_code,
            icd10_title,
            source.as_str(),
            program_id
        ],
    )
    .map_err(|e| DatabaseError::from_insert(e, "indication"))?;

    Ok(conn.last_insert_rowid())
}

/// All indications for a program, in insertion order.
pub fn get_indications_for_program(
    conn: &Connection,
    program_id: i64,
) -> Result<Vec<Indication>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, title, description, icd10_code, icd10_title, source, created_at, program_id
         FROM indications WHERE program_id = ?1 ORDER BY id",
    )?;

    let rows = stmt.query_map(params![program_id], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, Option<String>>(3)?,
            row.get::<_, Option<String>>(4)?,
            row.get::<_, String>(5)?,
            row.get::<_, String>(6)?,
            row.get::<_, i64>(7)?,
        ))
    })?;

    let mut indications = Vec::new();
    for row in rows {
        let (id, title, description, icd10_code, icd10_title, source, created_at, program_id) =
            row?;
        let source = ProvenanceSource::parse(&source)
            .ok_or_else(|| DatabaseError::InvalidSource(source.clone()))?;
        indications.push(Indication {
            id,
            title,
            description,
            icd10_code,
            icd10_title,
            source,
            created_at: parse_timestamp(&created_at),
            program_id,
        });
    }
    Ok(indications)
}

fn parse_timestamp(raw: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S"))
        .unwrap_or_default()
}
