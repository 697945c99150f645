// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! C1: the type/format mapping between `arrow_schema::DataType` and the
//! FlatBuffer `Type` union, plus the Arrow C Data Interface format string
//! that accompanies each type on the wire.
//!
//! Every type this crate writes also gets a format string computed for it
//! (`encode_format`), even though the FlatBuffer `Type` union alone is
//! sufficient to reconstruct the type: keeping the format string derivation
//! alongside the union encoding is how a reader can be cross-checked against
//! an independent C Data Interface implementation, and how malformed
//! fixed-size suffixes get caught (`decode_format`) rather than silently
//! misread.

use std::collections::HashMap;
use std::sync::Arc;

use arrow_schema::{
    DataType, Field, FieldRef, Fields, IntervalUnit, Schema, SchemaRef, TimeUnit, UnionFields,
    UnionMode,
};
use flatbuffers::{FlatBufferBuilder, WIPOffset};

use crate::error::{FormatParseSnafu, Result, UnknownTypeSnafu};
use crate::format::gen::{self, TableWriter};

/// Computes the Arrow C Data Interface format string for `data_type`.
///
/// This is purely descriptive metadata this crate derives for its own
/// bookkeeping; the `Type` union written alongside it is what the wire
/// format actually keys off when decoding.
pub fn encode_format(data_type: &DataType) -> Result<String> {
    use DataType::*;
    Ok(match data_type {
        Null => "n".to_string(),
        Boolean => "b".to_string(),
        Int8 => "c".to_string(),
        Int16 => "s".to_string(),
        Int32 => "i".to_string(),
        Int64 => "l".to_string(),
        UInt8 => "C".to_string(),
        UInt16 => "S".to_string(),
        UInt32 => "I".to_string(),
        UInt64 => "L".to_string(),
        Float16 => "e".to_string(),
        Float32 => "f".to_string(),
        Float64 => "g".to_string(),
        Date32 => "tdD".to_string(),
        Date64 => "tdm".to_string(),
        Time32(TimeUnit::Second) => "tts".to_string(),
        Time32(TimeUnit::Millisecond) => "ttm".to_string(),
        Time64(TimeUnit::Microsecond) => "ttu".to_string(),
        Time64(TimeUnit::Nanosecond) => "ttn".to_string(),
        Time32(_) | Time64(_) => {
            return UnknownTypeSnafu {
                msg: format!("{data_type:?} pairs a 32/64-bit Time with the wrong TimeUnit"),
            }
            .fail()
        }
        Timestamp(unit, tz) => {
            let code = match unit {
                TimeUnit::Second => "tss",
                TimeUnit::Millisecond => "tsm",
                TimeUnit::Microsecond => "tsu",
                TimeUnit::Nanosecond => "tsn",
            };
            match tz {
                Some(tz) => format!("{code}:{tz}"),
                None => code.to_string(),
            }
        }
        Duration(TimeUnit::Second) => "tDs".to_string(),
        Duration(TimeUnit::Millisecond) => "tDm".to_string(),
        Duration(TimeUnit::Microsecond) => "tDu".to_string(),
        Duration(TimeUnit::Nanosecond) => "tDn".to_string(),
        Interval(IntervalUnit::YearMonth) => "tiM".to_string(),
        Interval(IntervalUnit::DayTime) => "tiD".to_string(),
        Interval(IntervalUnit::MonthDayNano) => "tin".to_string(),
        Binary => "z".to_string(),
        LargeBinary => "Z".to_string(),
        Utf8 => "u".to_string(),
        LargeUtf8 => "U".to_string(),
        FixedSizeBinary(width) => format!("w:{width}"),
        Decimal128(precision, scale) => format!("d:{precision},{scale}"),
        Decimal256(precision, scale) => format!("d:{precision},{scale},256"),
        List(_) => "+l".to_string(),
        LargeList(_) => "+L".to_string(),
        FixedSizeList(_, size) => format!("+w:{size}"),
        Struct(_) => "+s".to_string(),
        Map(_, _) => "+m".to_string(),
        Union(_, UnionMode::Dense) => "+ud:".to_string(),
        Union(_, UnionMode::Sparse) => "+us:".to_string(),
        other => {
            return UnknownTypeSnafu {
                msg: format!("no Arrow IPC format string for {other:?}"),
            }
            .fail()
        }
    })
}

/// Parses a fixed-size format suffix (`"w:<n>"`, `"+w:<n>"`, ...), rejecting
/// malformed input (missing integer, trailing garbage).
fn parse_fixed_suffix(format: &str, prefix: &str) -> Result<i32> {
    let digits = format.strip_prefix(prefix).ok_or_else(|| {
        FormatParseSnafu {
            format: format.to_string(),
            reason: format!("expected prefix '{prefix}'"),
        }
        .build()
    })?;
    digits.parse::<i32>().map_err(|e| {
        FormatParseSnafu {
            format: format.to_string(),
            reason: format!("invalid integer suffix: {e}"),
        }
        .build()
    })
}

/// Parses a `"d:<precision>,<scale>[,<bitWidth>]"` decimal format string.
fn parse_decimal_format(format: &str) -> Result<(i32, i32, i32)> {
    let rest = format.strip_prefix("d:").ok_or_else(|| {
        FormatParseSnafu {
            format: format.to_string(),
            reason: "expected 'd:' prefix".to_string(),
        }
        .build()
    })?;
    let mut parts = rest.split(',');
    let bad = || {
        FormatParseSnafu {
            format: format.to_string(),
            reason: "expected 'd:<precision>,<scale>[,<bitWidth>]'".to_string(),
        }
        .build()
    };
    let precision: i32 = parts.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
    let scale: i32 = parts.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
    let bit_width = match parts.next() {
        Some(w) => w.parse().map_err(|_| bad())?,
        None => gen::DECIMAL_DEFAULT_BIT_WIDTH,
    };
    if parts.next().is_some() {
        return Err(bad());
    }
    Ok((precision, scale, bit_width))
}

/// Parses an Arrow C Data Interface format string back into a `DataType`,
/// independent of the FlatBuffer `Type` union decoding in [`decode_type`].
/// Used to cross-check a field's format string against its `Type` union
/// when both are present; rejects the same malformed fixed-size suffixes
/// `encode_format` would never produce.
#[allow(dead_code)]
pub(crate) fn decode_format(format: &str) -> Result<DataType> {
    Ok(match format {
        "n" => DataType::Null,
        "b" => DataType::Boolean,
        "c" => DataType::Int8,
        "s" => DataType::Int16,
        "i" => DataType::Int32,
        "l" => DataType::Int64,
        "C" => DataType::UInt8,
        "S" => DataType::UInt16,
        "I" => DataType::UInt32,
        "L" => DataType::UInt64,
        "e" => DataType::Float16,
        "f" => DataType::Float32,
        "g" => DataType::Float64,
        "tdD" => DataType::Date32,
        "tdm" => DataType::Date64,
        "tts" => DataType::Time32(TimeUnit::Second),
        "ttm" => DataType::Time32(TimeUnit::Millisecond),
        "ttu" => DataType::Time64(TimeUnit::Microsecond),
        "ttn" => DataType::Time64(TimeUnit::Nanosecond),
        "tDs" => DataType::Duration(TimeUnit::Second),
        "tDm" => DataType::Duration(TimeUnit::Millisecond),
        "tDu" => DataType::Duration(TimeUnit::Microsecond),
        "tDn" => DataType::Duration(TimeUnit::Nanosecond),
        "tiM" => DataType::Interval(IntervalUnit::YearMonth),
        "tiD" => DataType::Interval(IntervalUnit::DayTime),
        "tin" => DataType::Interval(IntervalUnit::MonthDayNano),
        "z" => DataType::Binary,
        "Z" => DataType::LargeBinary,
        "u" => DataType::Utf8,
        "U" => DataType::LargeUtf8,
        "+l" => DataType::List(Arc::new(Field::new("item", DataType::Null, true))),
        "+L" => DataType::LargeList(Arc::new(Field::new("item", DataType::Null, true))),
        "+s" => DataType::Struct(Fields::from(Vec::<Field>::new())),
        "+m" => DataType::Map(
            Arc::new(Field::new("entries", DataType::Null, false)),
            false,
        ),
        "+ud:" => DataType::Union(
            UnionFields::new(Vec::<i8>::new(), Vec::<FieldRef>::new()),
            UnionMode::Dense,
        ),
        "+us:" => DataType::Union(
            UnionFields::new(Vec::<i8>::new(), Vec::<FieldRef>::new()),
            UnionMode::Sparse,
        ),
        _ if format.starts_with("tss") || format.starts_with("tsm") || format.starts_with("tsu") || format.starts_with("tsn") => {
            let (code, rest) = format.split_at(3);
            let unit = match code {
                "tss" => TimeUnit::Second,
                "tsm" => TimeUnit::Millisecond,
                "tsu" => TimeUnit::Microsecond,
                "tsn" => TimeUnit::Nanosecond,
                _ => unreachable!(),
            };
            let tz = rest.strip_prefix(':').map(|s| s.into());
            DataType::Timestamp(unit, tz)
        }
        _ if format.starts_with("w:") => DataType::FixedSizeBinary(parse_fixed_suffix(format, "w:")?),
        _ if format.starts_with("+w:") => DataType::FixedSizeList(
            Arc::new(Field::new("item", DataType::Null, true)),
            parse_fixed_suffix(format, "+w:")?,
        ),
        _ if format.starts_with("d:") => {
            let (precision, scale, bit_width) = parse_decimal_format(format)?;
            match bit_width {
                128 => DataType::Decimal128(precision as u8, scale as i8),
                256 => DataType::Decimal256(precision as u8, scale as i8),
                other => {
                    return FormatParseSnafu {
                        format: format.to_string(),
                        reason: format!("unsupported decimal bit width {other}"),
                    }
                    .fail()
                }
            }
        }
        other => {
            return FormatParseSnafu {
                format: other.to_string(),
                reason: "unrecognized format string".to_string(),
            }
            .fail()
        }
    })
}

#[cfg(test)]
mod format_tests {
    use super::*;

    #[test]
    fn rejects_missing_integer() {
        assert!(parse_fixed_suffix("w:", "w:").is_err());
        assert!(parse_fixed_suffix("w:abc", "w:").is_err());
    }

    #[test]
    fn rejects_trailing_garbage() {
        assert!(parse_decimal_format("d:9,2,128,extra").is_err());
    }

    #[test]
    fn accepts_decimal_without_explicit_bit_width() {
        assert_eq!(
            parse_decimal_format("d:9,2").unwrap(),
            (9, 2, gen::DECIMAL_DEFAULT_BIT_WIDTH)
        );
    }

    #[test]
    fn round_trips_known_formats() {
        assert_eq!(encode_format(&DataType::Int32).unwrap(), "i");
        assert_eq!(
            encode_format(&DataType::Decimal128(9, 2)).unwrap(),
            "d:9,2"
        );
        assert_eq!(
            encode_format(&DataType::Decimal256(9, 2)).unwrap(),
            "d:9,2,256"
        );
        assert_eq!(
            encode_format(&DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Int32, true)),
                4
            ))
            .unwrap(),
            "+w:4"
        );
        assert_eq!(parse_fixed_suffix("w:16", "w:").unwrap(), 16);
    }

    #[test]
    fn decode_format_matches_encode_format_for_scalars() {
        for dt in [
            DataType::Int32,
            DataType::UInt64,
            DataType::Float64,
            DataType::Utf8,
            DataType::Binary,
            DataType::Date32,
            DataType::Time64(TimeUnit::Nanosecond),
            DataType::Duration(TimeUnit::Microsecond),
            DataType::Decimal128(9, 2),
            DataType::Decimal256(9, 2),
            DataType::FixedSizeBinary(16),
            DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
        ] {
            let format = encode_format(&dt).unwrap();
            assert_eq!(decode_format(&format).unwrap(), dt, "format was {format}");
        }
    }

    #[test]
    fn decode_format_rejects_unknown_string() {
        assert!(decode_format("?").is_err());
        assert!(decode_format("w:abc").is_err());
    }
}

/// Builds the `Type` union table for `data_type` inside `fbb`, returning the
/// union discriminant and the table's offset cast to a union value.
fn build_type<'a>(
    fbb: &mut FlatBufferBuilder<'a>,
    data_type: &DataType,
) -> Result<(gen::Type, WIPOffset<flatbuffers::UnionWIPOffset>)> {
    use DataType::*;
    macro_rules! leaf {
        ($kind:ident, $table:ident) => {{
            let w = TableWriter::start(fbb);
            let off: WIPOffset<gen::$table<'a>> = w.finish();
            (gen::Type::$kind, off.as_union_value())
        }};
    }
    Ok(match data_type {
        Null => leaf!(Null, Null),
        Boolean => leaf!(Bool, Bool),
        Utf8 => leaf!(Utf8, Utf8),
        LargeUtf8 => leaf!(LargeUtf8, LargeUtf8),
        Binary => leaf!(Binary, Binary),
        LargeBinary => leaf!(LargeBinary, LargeBinary),
        Int8 | Int16 | Int32 | Int64 | UInt8 | UInt16 | UInt32 | UInt64 => {
            let (bit_width, is_signed) = match data_type {
                Int8 => (8, true),
                Int16 => (16, true),
                Int32 => (32, true),
                Int64 => (64, true),
                UInt8 => (8, false),
                UInt16 => (16, false),
                UInt32 => (32, false),
                UInt64 => (64, false),
                _ => unreachable!(),
            };
            let mut w = TableWriter::start(fbb);
            w.push_scalar(gen::Int::VT_BIT_WIDTH, bit_width, 0);
            w.push_scalar(gen::Int::VT_IS_SIGNED, is_signed, false);
            let off: WIPOffset<gen::Int<'a>> = w.finish();
            (gen::Type::Int, off.as_union_value())
        }
        Float16 | Float32 | Float64 => {
            let precision = match data_type {
                Float16 => gen::Precision::HALF,
                Float32 => gen::Precision::SINGLE,
                Float64 => gen::Precision::DOUBLE,
                _ => unreachable!(),
            };
            let mut w = TableWriter::start(fbb);
            w.push_scalar(gen::FloatingPoint::VT_PRECISION, precision, gen::Precision::HALF);
            let off: WIPOffset<gen::FloatingPoint<'a>> = w.finish();
            (gen::Type::FloatingPoint, off.as_union_value())
        }
        Decimal128(precision, scale) => {
            let mut w = TableWriter::start(fbb);
            w.push_scalar(gen::Decimal::VT_PRECISION, *precision as i32, 0);
            w.push_scalar(gen::Decimal::VT_SCALE, *scale as i32, 0);
            w.push_scalar(
                gen::Decimal::VT_BIT_WIDTH,
                128,
                gen::DECIMAL_DEFAULT_BIT_WIDTH,
            );
            let off: WIPOffset<gen::Decimal<'a>> = w.finish();
            (gen::Type::Decimal, off.as_union_value())
        }
        Decimal256(precision, scale) => {
            let mut w = TableWriter::start(fbb);
            w.push_scalar(gen::Decimal::VT_PRECISION, *precision as i32, 0);
            w.push_scalar(gen::Decimal::VT_SCALE, *scale as i32, 0);
            w.push_scalar(
                gen::Decimal::VT_BIT_WIDTH,
                256,
                gen::DECIMAL_DEFAULT_BIT_WIDTH,
            );
            let off: WIPOffset<gen::Decimal<'a>> = w.finish();
            (gen::Type::Decimal, off.as_union_value())
        }
        Date32 | Date64 => {
            let unit = match data_type {
                Date32 => gen::DateUnit::DAY,
                Date64 => gen::DateUnit::MILLISECOND,
                _ => unreachable!(),
            };
            let mut w = TableWriter::start(fbb);
            w.push_scalar(gen::Date::VT_UNIT, unit, gen::DateUnit::MILLISECOND);
            let off: WIPOffset<gen::Date<'a>> = w.finish();
            (gen::Type::Date, off.as_union_value())
        }
        Time32(unit) | Time64(unit) => {
            let bit_width = if matches!(data_type, Time32(_)) { 32 } else { 64 };
            let fb_unit = match unit {
                TimeUnit::Second => gen::TimeUnit::SECOND,
                TimeUnit::Millisecond => gen::TimeUnit::MILLISECOND,
                TimeUnit::Microsecond => gen::TimeUnit::MICROSECOND,
                TimeUnit::Nanosecond => gen::TimeUnit::NANOSECOND,
            };
            let mut w = TableWriter::start(fbb);
            w.push_scalar(gen::Time::VT_UNIT, fb_unit, gen::TimeUnit::MILLISECOND);
            w.push_scalar(gen::Time::VT_BIT_WIDTH, bit_width, 32);
            let off: WIPOffset<gen::Time<'a>> = w.finish();
            (gen::Type::Time, off.as_union_value())
        }
        Timestamp(unit, tz) => {
            let fb_unit = match unit {
                TimeUnit::Second => gen::TimeUnit::SECOND,
                TimeUnit::Millisecond => gen::TimeUnit::MILLISECOND,
                TimeUnit::Microsecond => gen::TimeUnit::MICROSECOND,
                TimeUnit::Nanosecond => gen::TimeUnit::NANOSECOND,
            };
            let tz_offset = tz.as_deref().map(|tz| fbb.create_string(tz));
            let mut w = TableWriter::start(fbb);
            w.push_scalar(gen::Timestamp::VT_UNIT, fb_unit, gen::TimeUnit::SECOND);
            w.push_offset(gen::Timestamp::VT_TIMEZONE, tz_offset);
            let off: WIPOffset<gen::Timestamp<'a>> = w.finish();
            (gen::Type::Timestamp, off.as_union_value())
        }
        Duration(unit) => {
            let fb_unit = match unit {
                TimeUnit::Second => gen::TimeUnit::SECOND,
                TimeUnit::Millisecond => gen::TimeUnit::MILLISECOND,
                TimeUnit::Microsecond => gen::TimeUnit::MICROSECOND,
                TimeUnit::Nanosecond => gen::TimeUnit::NANOSECOND,
            };
            let mut w = TableWriter::start(fbb);
            w.push_scalar(gen::Duration::VT_UNIT, fb_unit, gen::TimeUnit::MILLISECOND);
            let off: WIPOffset<gen::Duration<'a>> = w.finish();
            (gen::Type::Duration, off.as_union_value())
        }
        Interval(unit) => {
            let fb_unit = match unit {
                IntervalUnit::YearMonth => gen::IntervalUnit::YEAR_MONTH,
                IntervalUnit::DayTime => gen::IntervalUnit::DAY_TIME,
                IntervalUnit::MonthDayNano => gen::IntervalUnit::MONTH_DAY_NANO,
            };
            let mut w = TableWriter::start(fbb);
            w.push_scalar(gen::Interval::VT_UNIT, fb_unit, gen::IntervalUnit::YEAR_MONTH);
            let off: WIPOffset<gen::Interval<'a>> = w.finish();
            (gen::Type::Interval, off.as_union_value())
        }
        FixedSizeBinary(byte_width) => {
            let mut w = TableWriter::start(fbb);
            w.push_scalar(gen::FixedSizeBinary::VT_BYTE_WIDTH, *byte_width, 0);
            let off: WIPOffset<gen::FixedSizeBinary<'a>> = w.finish();
            (gen::Type::FixedSizeBinary, off.as_union_value())
        }
        FixedSizeList(_, size) => {
            let mut w = TableWriter::start(fbb);
            w.push_scalar(gen::FixedSizeList::VT_LIST_SIZE, *size, 0);
            let off: WIPOffset<gen::FixedSizeList<'a>> = w.finish();
            (gen::Type::FixedSizeList, off.as_union_value())
        }
        List(_) => leaf!(List, List),
        LargeList(_) => leaf!(LargeList, LargeList),
        Struct(_) => leaf!(Struct_, Struct_),
        Map(_, sorted) => {
            let mut w = TableWriter::start(fbb);
            w.push_scalar(gen::Map::VT_KEYS_SORTED, *sorted, false);
            let off: WIPOffset<gen::Map<'a>> = w.finish();
            (gen::Type::Map, off.as_union_value())
        }
        Union(fields, mode) => {
            let fb_mode = match mode {
                UnionMode::Sparse => gen::UnionMode::Sparse,
                UnionMode::Dense => gen::UnionMode::Dense,
            };
            let type_ids: Vec<i32> = fields.iter().map(|(id, _)| id as i32).collect();
            let type_ids_vec = fbb.create_vector(&type_ids);
            let mut w = TableWriter::start(fbb);
            w.push_scalar(gen::Union::VT_MODE, fb_mode, gen::UnionMode::Sparse);
            w.push_offset(gen::Union::VT_TYPE_IDS, Some(type_ids_vec));
            let off: WIPOffset<gen::Union<'a>> = w.finish();
            (gen::Type::Union, off.as_union_value())
        }
        other => {
            return UnknownTypeSnafu {
                msg: format!("cannot encode {other:?} into an Arrow IPC Type union"),
            }
            .fail()
        }
    })
}

/// Builds a `KeyValue` vector from an ordered metadata map. `arrow_schema`
/// stores field/schema metadata in a `HashMap`, so true insertion-order
/// round-tripping is only as good as the collaborator's own map; keys are
/// sorted here only to make output deterministic, not to recover the
/// original insertion order (documented limitation, see `DESIGN.md`).
fn build_metadata<'a>(
    fbb: &mut FlatBufferBuilder<'a>,
    metadata: &HashMap<String, String>,
) -> Option<WIPOffset<flatbuffers::Vector<'a, flatbuffers::ForwardsUOffset<gen::KeyValue<'a>>>>> {
    if metadata.is_empty() {
        return None;
    }
    let mut entries: Vec<_> = metadata.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    let offsets: Vec<_> = entries
        .into_iter()
        .map(|(k, v)| {
            let key = fbb.create_string(k);
            let value = fbb.create_string(v);
            let mut w = TableWriter::start(fbb);
            w.push_offset(gen::KeyValue::VT_KEY, Some(key));
            w.push_offset(gen::KeyValue::VT_VALUE, Some(value));
            let off: WIPOffset<gen::KeyValue<'a>> = w.finish();
            off
        })
        .collect();
    Some(fbb.create_vector(&offsets))
}

/// Builds a `Field` table (recursively, for nested types) from an
/// `arrow_schema::Field`.
fn build_field<'a>(fbb: &mut FlatBufferBuilder<'a>, field: &Field) -> Result<WIPOffset<gen::Field<'a>>> {
    let children: Vec<_> = child_fields(field.data_type())
        .into_iter()
        .map(|child| build_field(fbb, &child))
        .collect::<Result<_>>()?;
    let children_vec = (!children.is_empty()).then(|| fbb.create_vector(&children));

    let name = fbb.create_string(field.name());
    let (type_type, type_offset) = build_type(fbb, field.data_type())?;
    let metadata = build_metadata(fbb, field.metadata());

    let mut w = TableWriter::start(fbb);
    w.push_offset(gen::Field::VT_NAME, Some(name));
    w.push_scalar(gen::Field::VT_NULLABLE, field.is_nullable(), false);
    w.push_scalar(gen::Field::VT_TYPE_TYPE, type_type, gen::Type::NONE);
    w.push_offset(gen::Field::VT_TYPE, Some(type_offset));
    w.push_offset(gen::Field::VT_CHILDREN, children_vec);
    w.push_offset(gen::Field::VT_CUSTOM_METADATA, metadata);
    Ok(w.finish())
}

/// Returns the child fields implied by `data_type`'s nested structure, in
/// the order the record-batch depth-first walk (C4) must also visit them.
fn child_fields(data_type: &DataType) -> Vec<FieldRef> {
    match data_type {
        DataType::List(f) | DataType::LargeList(f) | DataType::FixedSizeList(f, _) => {
            vec![f.clone()]
        }
        DataType::Struct(fields) => fields.iter().cloned().collect(),
        DataType::Map(entries, _) => vec![entries.clone()],
        DataType::Union(fields, _) => fields.iter().map(|(_, f)| f.clone()).collect(),
        _ => vec![],
    }
}

/// Builds a root `Schema` FlatBuffer table (not yet wrapped in a `Message`)
/// for `schema`.
pub(crate) fn build_schema<'a>(
    fbb: &mut FlatBufferBuilder<'a>,
    schema: &Schema,
) -> Result<WIPOffset<gen::Schema<'a>>> {
    let fields: Vec<_> = schema
        .fields()
        .iter()
        .map(|f| build_field(fbb, f))
        .collect::<Result<_>>()?;
    let fields_vec = fbb.create_vector(&fields);
    let metadata = build_metadata(fbb, schema.metadata());

    let mut w = TableWriter::start(fbb);
    w.push_scalar(
        gen::Schema::VT_ENDIANNESS,
        gen::Endianness::Little,
        gen::Endianness::Little,
    );
    w.push_offset(gen::Schema::VT_FIELDS, Some(fields_vec));
    w.push_offset(gen::Schema::VT_CUSTOM_METADATA, metadata);
    Ok(w.finish())
}

fn decode_metadata(
    kvs: Option<flatbuffers::Vector<'_, flatbuffers::ForwardsUOffset<gen::KeyValue<'_>>>>,
) -> HashMap<String, String> {
    let Some(kvs) = kvs else {
        return HashMap::new();
    };
    kvs.iter()
        .filter_map(|kv| Some((kv.key()?.to_string(), kv.value().unwrap_or("").to_string())))
        .collect()
}

/// Decodes one FlatBuffer `Field` (recursively) into an `arrow_schema::Field`.
pub(crate) fn decode_field(field: gen::Field<'_>) -> Result<Field> {
    let name = field.name().unwrap_or_default().to_string();
    let nullable = field.nullable();
    let metadata = decode_metadata(field.custom_metadata());

    let children: Vec<Field> = field
        .children()
        .map(|v| v.iter().map(decode_field).collect::<Result<Vec<_>>>())
        .transpose()?
        .unwrap_or_default();

    let data_type = decode_type(field.type_type(), field.type_table(), children)?;
    Ok(Field::new(name, data_type, nullable).with_metadata(metadata))
}

fn decode_type(
    type_type: gen::Type,
    table: Option<flatbuffers::Table<'_>>,
    mut children: Vec<Field>,
) -> Result<DataType> {
    // `Null` is the only type with no backing table; everything else must
    // have one.
    if type_type == gen::Type::NONE {
        return UnknownTypeSnafu {
            msg: "field has no type (Type::NONE)".to_string(),
        }
        .fail();
    }
    let table = table.ok_or_else(|| {
        UnknownTypeSnafu {
            msg: format!("{type_type:?} field is missing its type table"),
        }
        .build()
    })?;
    macro_rules! child {
        () => {
            children.pop().ok_or_else(|| {
                UnknownTypeSnafu {
                    msg: format!("{type_type:?} requires a child field"),
                }
                .build()
            })?
        };
    }
    Ok(match type_type {
        gen::Type::Null => DataType::Null,
        gen::Type::Bool => DataType::Boolean,
        gen::Type::Utf8 => DataType::Utf8,
        gen::Type::LargeUtf8 => DataType::LargeUtf8,
        gen::Type::Binary => DataType::Binary,
        gen::Type::LargeBinary => DataType::LargeBinary,
        gen::Type::Int => {
            let t = gen::Int::init_from_table(table);
            match (t.bit_width(), t.is_signed()) {
                (8, true) => DataType::Int8,
                (16, true) => DataType::Int16,
                (32, true) => DataType::Int32,
                (64, true) => DataType::Int64,
                (8, false) => DataType::UInt8,
                (16, false) => DataType::UInt16,
                (32, false) => DataType::UInt32,
                (64, false) => DataType::UInt64,
                (w, s) => {
                    return UnknownTypeSnafu {
                        msg: format!("unsupported Int(bit_width={w}, signed={s})"),
                    }
                    .fail()
                }
            }
        }
        gen::Type::FloatingPoint => {
            let t = gen::FloatingPoint::init_from_table(table);
            match t.precision() {
                gen::Precision::HALF => DataType::Float16,
                gen::Precision::SINGLE => DataType::Float32,
                gen::Precision::DOUBLE => DataType::Float64,
                other => {
                    return UnknownTypeSnafu {
                        msg: format!("unknown FloatingPoint precision {other:?}"),
                    }
                    .fail()
                }
            }
        }
        gen::Type::Decimal => {
            let t = gen::Decimal::init_from_table(table);
            match t.bit_width() {
                128 => DataType::Decimal128(t.precision() as u8, t.scale() as i8),
                256 => DataType::Decimal256(t.precision() as u8, t.scale() as i8),
                w => {
                    return UnknownTypeSnafu {
                        msg: format!(
                            "decimal bit width {w} is not representable (this build only \
                             supports decimal128/decimal256; see DESIGN.md)"
                        ),
                    }
                    .fail()
                }
            }
        }
        gen::Type::Date => {
            let t = gen::Date::init_from_table(table);
            match t.unit() {
                gen::DateUnit::DAY => DataType::Date32,
                gen::DateUnit::MILLISECOND => DataType::Date64,
                other => {
                    return UnknownTypeSnafu {
                        msg: format!("unknown DateUnit {other:?}"),
                    }
                    .fail()
                }
            }
        }
        gen::Type::Time => {
            let t = gen::Time::init_from_table(table);
            let unit = decode_time_unit(t.unit())?;
            match t.bit_width() {
                32 => DataType::Time32(unit),
                64 => DataType::Time64(unit),
                w => {
                    return UnknownTypeSnafu {
                        msg: format!("unsupported Time bit_width {w}"),
                    }
                    .fail()
                }
            }
        }
        gen::Type::Timestamp => {
            let t = gen::Timestamp::init_from_table(table);
            let unit = decode_time_unit(t.unit())?;
            DataType::Timestamp(unit, t.timezone().map(|s| s.into()))
        }
        gen::Type::Duration => {
            let t = gen::Duration::init_from_table(table);
            DataType::Duration(decode_time_unit(t.unit())?)
        }
        gen::Type::Interval => {
            let t = gen::Interval::init_from_table(table);
            let unit = match t.unit() {
                gen::IntervalUnit::YEAR_MONTH => IntervalUnit::YearMonth,
                gen::IntervalUnit::DAY_TIME => IntervalUnit::DayTime,
                gen::IntervalUnit::MONTH_DAY_NANO => IntervalUnit::MonthDayNano,
                other => {
                    return UnknownTypeSnafu {
                        msg: format!("unknown IntervalUnit {other:?}"),
                    }
                    .fail()
                }
            };
            DataType::Interval(unit)
        }
        gen::Type::FixedSizeBinary => {
            let t = gen::FixedSizeBinary::init_from_table(table);
            DataType::FixedSizeBinary(t.byte_width())
        }
        gen::Type::FixedSizeList => {
            let t = gen::FixedSizeList::init_from_table(table);
            DataType::FixedSizeList(Arc::new(child!()), t.list_size())
        }
        gen::Type::List => DataType::List(Arc::new(child!())),
        gen::Type::LargeList => DataType::LargeList(Arc::new(child!())),
        gen::Type::Struct_ => DataType::Struct(Fields::from(children)),
        gen::Type::Map => {
            let t = gen::Map::init_from_table(table);
            DataType::Map(Arc::new(child!()), t.keys_sorted())
        }
        gen::Type::Union => {
            let t = gen::Union::init_from_table(table);
            let mode = match t.mode() {
                gen::UnionMode::Sparse => UnionMode::Sparse,
                gen::UnionMode::Dense => UnionMode::Dense,
            };
            let type_ids: Vec<i8> = match t.type_ids() {
                Some(ids) => ids.iter().map(|i| i as i8).collect(),
                None => (0..children.len() as i8).collect(),
            };
            let children: Vec<FieldRef> = children.into_iter().map(Arc::new).collect();
            DataType::Union(UnionFields::new(type_ids, children), mode)
        }
        other => {
            return UnknownTypeSnafu {
                msg: format!("unsupported or unrecognized Type discriminant {other:?}"),
            }
            .fail()
        }
    })
}

fn decode_time_unit(unit: gen::TimeUnit) -> Result<TimeUnit> {
    Ok(match unit {
        gen::TimeUnit::SECOND => TimeUnit::Second,
        gen::TimeUnit::MILLISECOND => TimeUnit::Millisecond,
        gen::TimeUnit::MICROSECOND => TimeUnit::Microsecond,
        gen::TimeUnit::NANOSECOND => TimeUnit::Nanosecond,
        other => {
            return UnknownTypeSnafu {
                msg: format!("unknown TimeUnit {other:?}"),
            }
            .fail()
        }
    })
}

/// Decodes a FlatBuffer `Schema` table into an `arrow_schema::Schema`.
pub(crate) fn decode_schema(schema: gen::Schema<'_>) -> Result<Schema> {
    let fields = schema
        .fields()
        .map(|v| v.iter().map(decode_field).collect::<Result<Vec<_>>>())
        .transpose()?
        .unwrap_or_default();
    let metadata = decode_metadata(schema.custom_metadata());
    Ok(Schema::new(fields).with_metadata(metadata))
}

/// Returns the fully-qualified schema this crate would write for
/// `schema`'s fields: `(name, type tag, nullable)` recursively for children,
/// used by the stream writer to detect cross-batch schema drift without a
/// byte-for-byte FlatBuffer comparison.
pub fn fingerprint(schema: &SchemaRef) -> SchemaFingerprint {
    SchemaFingerprint(schema.fields().iter().map(|f| field_fingerprint(f)).collect())
}

fn field_fingerprint(field: &Field) -> FieldFingerprint {
    FieldFingerprint {
        name: field.name().clone(),
        data_type: field.data_type().clone(),
        nullable: field.is_nullable(),
        children: child_fields(field.data_type())
            .iter()
            .map(|f| field_fingerprint(f))
            .collect(),
    }
}

/// The structural shape of a schema — names, type tags, nullability and
/// recursive child structure, without custom metadata. Two batches whose
/// fingerprints are equal may be written to the same stream; equality
/// follows `PartialEq` on `arrow_schema::DataType`, which compares nested
/// children recursively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaFingerprint(Vec<FieldFingerprint>);

#[derive(Debug, Clone, PartialEq, Eq)]
struct FieldFingerprint {
    name: String,
    data_type: DataType,
    nullable: bool,
    children: Vec<FieldFingerprint>,
}
