//! Randomized tests for the query compiler.
//!
//! Random expression trees are compiled for every backend and checked for the
//! properties that must hold for any input: one placeholder per value, in
//! order, and identical output for identical input.

use db_dialect::dialect::DialectAdapter;
use db_dialect::models::{Backend, Value};
use db_dialect::query::{CompiledQuery, Direction, Expr, QueryCompiler, SelectQuery, UpdateQuery};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const COLUMNS: &[&str] = &["id", "name", "user_id", "Created At", "score"];
const ITERATIONS: u64 = 300;

/// Random expression and the number of value nodes it contains.
fn gen_expr(rng: &mut StdRng, depth: u32) -> (Expr, usize) {
    let choice = if depth == 0 {
        rng.gen_range(0..2)
    } else {
        rng.gen_range(0..8)
    };
    match choice {
        0 => (Expr::col(pick_column(rng)), 0),
        1 => (Expr::val(gen_value(rng)), 1),
        2 => {
            let (left, l) = gen_expr(rng, depth - 1);
            let (right, r) = gen_expr(rng, depth - 1);
            let expr = match rng.gen_range(0..6) {
                0 => left.eq(right),
                1 => left.ne(right),
                2 => left.lt(right),
                3 => left.gte(right),
                4 => left.like(right),
                _ => left.add(right),
            };
            (expr, l + r)
        }
        3 | 4 => {
            let (mut expr, mut count) = gen_expr(rng, depth - 1);
            for _ in 0..rng.gen_range(1..3) {
                let (next, n) = gen_expr(rng, depth - 1);
                expr = if choice == 3 { expr.and(next) } else { expr.or(next) };
                count += n;
            }
            (expr, count)
        }
        5 => {
            let (target, t) = gen_expr(rng, depth - 1);
            let len = rng.gen_range(1..5);
            let values: Vec<Value> = (0..len).map(|_| gen_value(rng)).collect();
            if rng.gen_bool(0.5) {
                (target.in_list(values), t + len)
            } else {
                (target.not_in_list(values), t + len)
            }
        }
        6 => {
            let (target, t) = gen_expr(rng, depth - 1);
            let (low, l) = gen_expr(rng, depth - 1);
            let (high, h) = gen_expr(rng, depth - 1);
            (target.between(low, high), t + l + h)
        }
        _ => {
            let (inner, n) = gen_expr(rng, depth - 1);
            let expr = match rng.gen_range(0..3) {
                0 => inner.not(),
                1 => inner.is_null(),
                _ => inner.is_not_null(),
            };
            (expr, n)
        }
    }
}

fn gen_value(rng: &mut StdRng) -> Value {
    match rng.gen_range(0..5) {
        0 => Value::Null,
        1 => Value::Bool(rng.gen_bool(0.5)),
        2 => Value::Int(rng.gen_range(-1_000_000..1_000_000)),
        3 => Value::Float(rng.gen_range(-1000.0..1000.0)),
        _ => {
            let len = rng.gen_range(0..12);
            let text: String = (0..len)
                .map(|_| rng.sample(rand::distributions::Alphanumeric) as char)
                .collect();
            Value::Text(text)
        }
    }
}

fn pick_column(rng: &mut StdRng) -> &'static str {
    COLUMNS[rng.gen_range(0..COLUMNS.len())]
}

/// Random SELECT and the number of values it binds.
fn gen_select(rng: &mut StdRng) -> (SelectQuery, usize) {
    let mut query = SelectQuery::from_table("items");
    let mut values = 0;

    for _ in 0..rng.gen_range(0..3) {
        query = query.column(Expr::col(pick_column(rng)));
    }
    for _ in 0..rng.gen_range(0..3) {
        let (condition, n) = gen_expr(rng, 3);
        query = query.filter(condition);
        values += n;
    }
    if rng.gen_bool(0.3) {
        query = query.order_by(Expr::col(pick_column(rng)), Direction::Desc);
    }
    if rng.gen_bool(0.5) {
        query = query.limit(rng.gen_range(1..1000));
        values += 1;
    }
    if rng.gen_bool(0.3) {
        query = query.offset(rng.gen_range(0..1000));
        values += 1;
    }
    (query, values)
}

fn compile_for(backend: Backend, query: &SelectQuery) -> CompiledQuery {
    QueryCompiler::new(DialectAdapter::for_backend(backend))
        .compile(&query.clone().into())
        .unwrap()
}

/// `$n` placeholders in order of appearance.
fn dollar_placeholders(sql: &str) -> Vec<usize> {
    let mut found = Vec::new();
    for (i, c) in sql.char_indices() {
        if c != '$' {
            continue;
        }
        let digits: String = sql[i + 1..]
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect();
        if let Ok(n) = digits.parse() {
            found.push(n);
        }
    }
    found
}

#[test]
fn test_fuzz_one_placeholder_per_value() {
    for seed in 0..ITERATIONS {
        let mut rng = StdRng::seed_from_u64(seed);
        let (query, expected) = gen_select(&mut rng);

        let pg = compile_for(Backend::PostgreSQL, &query);
        assert_eq!(pg.parameters.len(), expected, "seed {seed}: {}", pg.sql);
        assert_eq!(
            dollar_placeholders(&pg.sql),
            (1..=expected).collect::<Vec<_>>(),
            "seed {seed}: {}",
            pg.sql
        );

        for backend in [Backend::MySQL, Backend::SQLite] {
            let compiled = compile_for(backend, &query);
            assert_eq!(compiled.parameters, pg.parameters, "seed {seed}");
            assert_eq!(
                compiled.sql.matches('?').count(),
                expected,
                "seed {seed}: {}",
                compiled.sql
            );
        }
    }
}

#[test]
fn test_fuzz_compilation_is_deterministic() {
    for seed in 0..ITERATIONS {
        let mut rng = StdRng::seed_from_u64(seed);
        let (query, _) = gen_select(&mut rng);

        for backend in [Backend::PostgreSQL, Backend::MySQL, Backend::SQLite] {
            let compiler = QueryCompiler::new(DialectAdapter::for_backend(backend));
            let first = compiler.compile(&query.clone().into()).unwrap();
            let second = compiler.compile(&query.clone().into()).unwrap();
            assert_eq!(first, second, "seed {seed} on {backend}");
        }
    }
}

#[test]
fn test_fuzz_update_binds_assignments_before_filter() {
    for seed in 0..ITERATIONS {
        let mut rng = StdRng::seed_from_u64(seed);
        let assigned = gen_value(&mut rng);
        let (condition, n) = gen_expr(&mut rng, 2);

        let query = UpdateQuery::table("items")
            .set("name", assigned.clone())
            .filter(condition);
        let compiled = QueryCompiler::new(DialectAdapter::for_backend(Backend::PostgreSQL))
            .compile(&query.into())
            .unwrap();

        assert_eq!(compiled.parameters.len(), n + 1, "seed {seed}");
        assert_eq!(compiled.parameters[0], assigned, "seed {seed}");
    }
}
