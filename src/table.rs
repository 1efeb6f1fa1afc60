//! Text-cell helpers over polars `DataFrame`s.
//!
//! Input CSVs are read with every column as `String` (empty field = null);
//! only `frame` is cast to `Int64` for joins and sorting.

use std::fs::File;
use std::io::Cursor;
use std::path::Path;

use polars::prelude::*;
use thiserror::Error;

pub const FRAME: &str = "frame";

#[derive(Error, Debug)]
pub enum TableError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Polars(#[from] PolarsError),
}

fn read_options() -> CsvReadOptions {
    // Schema length 0 reads every column as String
    CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
}

/// Read a CSV with a header row, all columns as text.
pub fn read_csv(path: &Path) -> Result<DataFrame, TableError> {
    let df = read_options()
        .try_into_reader_with_file_path(Some(path.into()))?
        .finish()?;
    Ok(df)
}

/// Parse in-memory CSV text, all columns as text.
pub fn parse_csv(text: &str) -> Result<DataFrame, TableError> {
    let df = read_options()
        .into_reader_with_file_handle(Cursor::new(text.as_bytes().to_vec()))
        .finish()?;
    Ok(df)
}

/// Write with a header row; nulls become empty fields.
pub fn write_csv(df: &mut DataFrame, path: &Path) -> Result<(), TableError> {
    let mut file = File::create(path)?;
    CsvWriter::new(&mut file).include_header(true).finish(df)?;
    Ok(())
}

pub fn text_column(name: &str, values: &[Option<String>]) -> Column {
    let refs: Vec<Option<&str>> = values.iter().map(|v| v.as_deref()).collect();
    Column::new(name.into(), refs)
}

/// Build a text frame from ordered key/value records. Columns follow the
/// order in which keys are first seen; keys a record lacks are null.
pub fn from_records<I>(records: I) -> PolarsResult<DataFrame>
where
    I: IntoIterator<Item = Vec<(String, String)>>,
{
    let records: Vec<Vec<(String, String)>> = records.into_iter().collect();
    let mut names: Vec<&str> = Vec::new();
    for record in &records {
        for (key, _) in record {
            if !names.contains(&key.as_str()) {
                names.push(key);
            }
        }
    }

    let columns = names
        .iter()
        .map(|name| {
            let values: Vec<Option<&str>> = records
                .iter()
                .map(|r| r.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str()))
                .collect();
            Column::new((*name).into(), values)
        })
        .collect();
    DataFrame::new(columns)
}

/// Like [`from_records`], but always carries an `Int64` `frame` column.
pub fn frame_table<I>(records: I) -> PolarsResult<DataFrame>
where
    I: IntoIterator<Item = Vec<(String, String)>>,
{
    let df = from_records(records)?;
    if has_column(&df, FRAME) {
        cast_frame(df)
    } else if df.width() == 0 {
        DataFrame::new(vec![Column::new(FRAME.into(), Vec::<i64>::new())])
    } else {
        Err(PolarsError::ColumnNotFound(FRAME.into()))
    }
}

pub fn cast_frame(df: DataFrame) -> PolarsResult<DataFrame> {
    df.lazy()
        .with_column(col(FRAME).cast(DataType::Int64))
        .collect()
}

pub fn has_column(df: &DataFrame, name: &str) -> bool {
    df.get_column_index(name).is_some()
}

pub fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_column_names().iter().map(|c| c.to_string()).collect()
}

/// Column values as text, or `Err` if the column is missing.
pub fn require_text(df: &DataFrame, name: &str) -> PolarsResult<Vec<Option<String>>> {
    let column = df.column(name)?.cast(&DataType::String)?;
    Ok(column
        .str()?
        .into_iter()
        .map(|v| v.map(str::to_string))
        .collect())
}

/// Column values as text; a missing column reads as all null.
pub fn text(df: &DataFrame, name: &str) -> Vec<Option<String>> {
    require_text(df, name).unwrap_or_else(|_| vec![None; df.height()])
}

/// Non-null values of a column in row order.
pub fn non_null(df: &DataFrame, name: &str) -> Vec<String> {
    text(df, name).into_iter().flatten().collect()
}

pub fn get(df: &DataFrame, row: usize, name: &str) -> Option<String> {
    match df.column(name).ok()?.get(row).ok()? {
        AnyValue::Null => None,
        AnyValue::String(s) => Some(s.to_string()),
        other => Some(other.to_string()),
    }
}

/// Replace a column in place, or append it.
pub fn set_text(df: &mut DataFrame, name: &str, values: &[Option<String>]) -> PolarsResult<()> {
    df.with_column(text_column(name, values))?;
    Ok(())
}

/// Drop a column if present.
pub fn drop_column(df: &mut DataFrame, name: &str) -> bool {
    df.drop_in_place(name).is_ok()
}

/// Move `names` (those present) to the front, keeping the rest in order.
pub fn move_to_front(df: &DataFrame, names: &[&str]) -> PolarsResult<DataFrame> {
    let columns = column_names(df);
    let mut order: Vec<String> = names
        .iter()
        .filter(|n| columns.iter().any(|c| c == *n))
        .map(|n| n.to_string())
        .collect();
    order.extend(columns.into_iter().filter(|c| !names.contains(&c.as_str())));
    df.select(order)
}

/// Join on `frame` keeping the order of `left`. Overlapping non-key
/// columns come out as `<name><left suffix>` and `<name><right suffix>`.
pub fn join_on_frame(
    left: &DataFrame,
    right: &DataFrame,
    how: JoinType,
    (left_suffix, right_suffix): (&str, &str),
) -> PolarsResult<DataFrame> {
    let right_names = column_names(right);
    let overlap: Vec<String> = column_names(left)
        .into_iter()
        .filter(|c| c != FRAME && right_names.contains(c))
        .collect();

    let args = JoinArgs {
        maintain_order: MaintainOrderJoin::LeftRight,
        ..JoinArgs::new(how).with_suffix(Some(right_suffix.into()))
    };
    let mut joined = left
        .clone()
        .lazy()
        .join(right.clone().lazy(), [col(FRAME)], [col(FRAME)], args)
        .collect()?;
    for name in &overlap {
        joined.rename(name, format!("{name}{left_suffix}").into())?;
    }
    Ok(joined)
}

/// Collapse a suffixed pair back into `name`; the first non-null value wins.
pub fn coalesce_pair(
    df: DataFrame,
    name: &str,
    (left_suffix, right_suffix): (&str, &str),
) -> PolarsResult<DataFrame> {
    let left = format!("{name}{left_suffix}");
    let right = format!("{name}{right_suffix}");
    if !has_column(&df, &left) || !has_column(&df, &right) {
        return Ok(df);
    }
    let mut out = df
        .lazy()
        .with_column(coalesce(&[col(left.as_str()), col(right.as_str())]).alias(name))
        .collect()?;
    drop_column(&mut out, &left);
    drop_column(&mut out, &right);
    Ok(out)
}

/// One row per frame, first occurrence kept.
pub fn unique_frames(df: &DataFrame) -> PolarsResult<DataFrame> {
    let subset = [FRAME.to_string()];
    df.unique_stable(Some(&subset), UniqueKeepStrategy::First, None)
}

pub fn sort_by_frame(df: &DataFrame) -> PolarsResult<DataFrame> {
    df.sort([FRAME], SortMultipleOptions::default().with_maintain_order(true))
}

pub fn frames(df: &DataFrame) -> Vec<Option<i64>> {
    let Ok(column) = df.column(FRAME).and_then(|c| c.cast(&DataType::Int64)) else {
        return vec![None; df.height()];
    };
    match column.i64() {
        Ok(ca) => ca.into_iter().collect(),
        Err(_) => vec![None; df.height()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_from_records_union_of_keys() {
        let df = from_records(vec![
            record(&[("frame", "0"), ("a", "x")]),
            record(&[("b", "y"), ("frame", "1")]),
        ])
        .unwrap();
        assert_eq!(column_names(&df), vec!["frame", "a", "b"]);
        assert_eq!(get(&df, 0, "b"), None);
        assert_eq!(get(&df, 1, "b").as_deref(), Some("y"));
    }

    #[test]
    fn test_frame_table_casts_and_fills() {
        let df = frame_table(vec![record(&[("frame", "3")])]).unwrap();
        assert_eq!(df.column(FRAME).unwrap().dtype(), &DataType::Int64);
        assert_eq!(frames(&df), vec![Some(3)]);

        let empty = frame_table(Vec::new()).unwrap();
        assert_eq!(column_names(&empty), vec!["frame"]);
        assert_eq!(empty.height(), 0);
    }

    #[test]
    fn test_parse_csv_reads_text_and_nulls() {
        let df = parse_csv("frame,lat,note\n2,0.25,\n10,,\"a, b\"\n").unwrap();
        assert_eq!(df.column("frame").unwrap().dtype(), &DataType::String);
        assert_eq!(text(&df, "lat"), vec![Some("0.25".to_string()), None]);
        assert_eq!(get(&df, 1, "note").as_deref(), Some("a, b"));
        assert_eq!(text(&df, "missing"), vec![None, None]);
        assert!(require_text(&df, "missing").is_err());
    }

    #[test]
    fn test_set_text_replaces_or_appends() {
        let mut df = parse_csv("eventID,eventTime\nA,\nB,\n").unwrap();
        set_text(&mut df, "eventTime", &[Some("t".to_string()), None]).unwrap();
        set_text(&mut df, "endTime", &[None, Some("u".to_string())]).unwrap();
        assert_eq!(column_names(&df), vec!["eventID", "eventTime", "endTime"]);
        assert_eq!(get(&df, 0, "eventTime").as_deref(), Some("t"));
        assert_eq!(get(&df, 1, "endTime").as_deref(), Some("u"));
    }

    #[test]
    fn test_move_to_front_and_sort() {
        let df = cast_frame(parse_csv("x,id,frame\na,1,2\nb,2,0\nc,3,2\n").unwrap()).unwrap();
        let df = move_to_front(&df, &["date", "frame", "id"]).unwrap();
        assert_eq!(column_names(&df), vec!["frame", "id", "x"]);

        let sorted = sort_by_frame(&df).unwrap();
        assert_eq!(frames(&sorted), vec![Some(0), Some(2), Some(2)]);
        assert_eq!(non_null(&sorted, "x"), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_join_on_frame_suffixes_both_sides() {
        let left = cast_frame(parse_csv("frame,date,a\n0,d0,x\n1,d1,y\n").unwrap()).unwrap();
        let right = cast_frame(parse_csv("frame,date,b\n1,r1,p\n1,r1,q\n").unwrap()).unwrap();

        let out = join_on_frame(&left, &right, JoinType::Left, ("_x", "_y")).unwrap();
        assert_eq!(column_names(&out), vec!["frame", "date_x", "a", "date_y", "b"]);
        assert_eq!(frames(&out), vec![Some(0), Some(1), Some(1)]);
        assert_eq!(text(&out, "b"), vec![None, Some("p".to_string()), Some("q".to_string())]);

        let inner = join_on_frame(&left, &right, JoinType::Inner, ("_x", "_y")).unwrap();
        assert_eq!(inner.height(), 2);

        let out = coalesce_pair(out, "date", ("_x", "_y")).unwrap();
        assert!(!has_column(&out, "date_x") && !has_column(&out, "date_y"));
        assert_eq!(non_null(&out, "date"), vec!["d0", "d1", "d1"]);
    }

    #[test]
    fn test_unique_frames_keeps_first() {
        let df = cast_frame(parse_csv("frame,id\n2,a\n1,b\n2,c\n").unwrap()).unwrap();
        let out = unique_frames(&df).unwrap();
        assert_eq!(frames(&out), vec![Some(2), Some(1)]);
        assert_eq!(non_null(&out, "id"), vec!["a", "b"]);
    }

    #[test]
    fn test_csv_write_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let mut df = cast_frame(parse_csv("frame,name\n1,\"x, y\"\n2,\n").unwrap()).unwrap();
        write_csv(&mut df, &path).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, "frame,name\n1,\"x, y\"\n2,\n");
        let back = read_csv(&path).unwrap();
        assert_eq!(get(&back, 1, "name"), None);
    }
}
