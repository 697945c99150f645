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

//! Hand-authored bindings for the subset of `Schema.fbs`, `Message.fbs` and
//! `File.fbs` this crate needs, built directly on top of the [`flatbuffers`]
//! runtime. There is no `flatc` step in this crate's build: these tables and
//! structs are written in the same shape `flatc --rust` would emit, but kept
//! to exactly the fields the codec reads or writes. Field numbering follows
//! the published Arrow format so the bytes this module parses (and so the
//! bytes it emits) are the bytes any other Arrow implementation understands.

#![allow(non_snake_case)]

use flatbuffers::{FlatBufferBuilder, Follow, Push, Table, WIPOffset};

macro_rules! fb_enum {
    ($name:ident : $repr:ty { $($variant:ident = $val:expr),* $(,)? }) => {
        #[derive(Clone, Copy, PartialEq, Eq, Default, Hash)]
        #[repr(transparent)]
        pub struct $name(pub $repr);

        #[allow(non_upper_case_globals)]
        impl $name {
            $(pub const $variant: Self = Self($val);)*
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match *self {
                    $(Self::$variant => write!(f, stringify!($variant)),)*
                    Self(other) => write!(f, concat!(stringify!($name), "({})"), other),
                }
            }
        }

        impl<'a> Follow<'a> for $name {
            type Inner = Self;
            #[inline]
            unsafe fn follow(buf: &'a [u8], loc: usize) -> Self::Inner {
                let mut bytes = [0u8; std::mem::size_of::<$repr>()];
                bytes.copy_from_slice(&buf[loc..loc + bytes.len()]);
                Self(<$repr>::from_le_bytes(bytes))
            }
        }

        impl Push for $name {
            type Output = Self;
            #[inline]
            unsafe fn push(&self, dst: &mut [u8], _written_len: usize) {
                dst.copy_from_slice(&self.0.to_le_bytes());
            }
        }
    };
}

fb_enum!(MetadataVersion: i16 { V1 = 0, V2 = 1, V3 = 2, V4 = 3, V5 = 4 });
fb_enum!(Endianness: i16 { Little = 0, Big = 1 });
fb_enum!(MessageHeader: u8 {
    NONE = 0,
    Schema = 1,
    DictionaryBatch = 2,
    RecordBatch = 3,
    Tensor = 4,
    SparseTensor = 5,
});
fb_enum!(Type: u8 {
    NONE = 0,
    Null = 1,
    Int = 2,
    FloatingPoint = 3,
    Binary = 4,
    Utf8 = 5,
    Bool = 6,
    Decimal = 7,
    Date = 8,
    Time = 9,
    Timestamp = 10,
    Interval = 11,
    List = 12,
    Struct_ = 13,
    Union = 14,
    FixedSizeBinary = 15,
    FixedSizeList = 16,
    Map = 17,
    Duration = 18,
    LargeBinary = 19,
    LargeUtf8 = 20,
    LargeList = 21,
});
fb_enum!(DateUnit: i16 { DAY = 0, MILLISECOND = 1 });
fb_enum!(TimeUnit: i16 { SECOND = 0, MILLISECOND = 1, MICROSECOND = 2, NANOSECOND = 3 });
fb_enum!(IntervalUnit: i16 { YEAR_MONTH = 0, DAY_TIME = 1, MONTH_DAY_NANO = 2 });
fb_enum!(UnionMode: i16 { Sparse = 0, Dense = 1 });
fb_enum!(Precision: i16 { HALF = 0, SINGLE = 1, DOUBLE = 2 });
fb_enum!(CompressionType: i8 { Lz4Frame = 0, Zstd = 1 });
fb_enum!(BodyCompressionMethod: i8 { Buffer = 0 });

/// Default byte width for `Decimal`, matching the FlatBuffer schema default.
pub const DECIMAL_DEFAULT_BIT_WIDTH: i32 = 128;

macro_rules! fb_struct {
    ($name:ident { $($field:ident : $ty:ty),* $(,)? }) => {
        #[derive(Clone, Copy, Debug, PartialEq, Default)]
        pub struct $name {
            $(pub $field: $ty,)*
        }

        impl $name {
            pub const SIZE: usize = 0 $(+ std::mem::size_of::<$ty>())*;

            #[allow(clippy::too_many_arguments)]
            pub fn new($($field: $ty),*) -> Self {
                Self { $($field),* }
            }

            fn to_le_bytes(self) -> Vec<u8> {
                let mut out = Vec::with_capacity(Self::SIZE);
                $(out.extend_from_slice(&self.$field.to_le_bytes());)*
                out
            }

            fn from_le_bytes(bytes: &[u8]) -> Self {
                let mut offset = 0usize;
                $(
                    let mut buf = [0u8; std::mem::size_of::<$ty>()];
                    buf.copy_from_slice(&bytes[offset..offset + buf.len()]);
                    let $field = <$ty>::from_le_bytes(buf);
                    offset += buf.len();
                )*
                Self { $($field),* }
            }
        }

        impl<'a> Follow<'a> for $name {
            type Inner = Self;
            #[inline]
            unsafe fn follow(buf: &'a [u8], loc: usize) -> Self::Inner {
                Self::from_le_bytes(&buf[loc..loc + Self::SIZE])
            }
        }

        impl Push for $name {
            type Output = Self;
            #[inline]
            unsafe fn push(&self, dst: &mut [u8], _written_len: usize) {
                dst[..Self::SIZE].copy_from_slice(&self.to_le_bytes());
            }
        }
    };
}

fb_struct!(FieldNode { length: i64, null_count: i64 });
fb_struct!(Buffer { offset: i64, length: i64 });
// `padding` keeps `body_length` 8-byte aligned within the struct, mirroring
// the explicit padding field the published schema uses for the same reason.
fb_struct!(Block { offset: i64, meta_data_length: i32, padding: i32, body_length: i64 });

/// A table backed directly by a [`flatbuffers::Table`], used for every
/// FlatBuffer *table* (as opposed to *struct*) this crate reads.
macro_rules! fb_table {
    ($name:ident) => {
        #[derive(Clone, Copy)]
        pub struct $name<'a> {
            pub(crate) _tab: Table<'a>,
        }

        impl<'a> Follow<'a> for $name<'a> {
            type Inner = Self;
            #[inline]
            unsafe fn follow(buf: &'a [u8], loc: usize) -> Self::Inner {
                Self {
                    _tab: Table::new(buf, loc),
                }
            }
        }

        impl<'a> $name<'a> {
            #[inline]
            pub(crate) fn init_from_table(table: Table<'a>) -> Self {
                Self { _tab: table }
            }
        }
    };
}

fb_table!(Null);
fb_table!(Utf8);
fb_table!(LargeUtf8);
fb_table!(Binary);
fb_table!(LargeBinary);
fb_table!(Bool);
fb_table!(List);
fb_table!(LargeList);
fb_table!(Struct_);

fb_table!(Int);
impl<'a> Int<'a> {
    pub const VT_BIT_WIDTH: u16 = 4;
    pub const VT_IS_SIGNED: u16 = 6;

    pub fn bit_width(&self) -> i32 {
        self._tab.get::<i32>(Self::VT_BIT_WIDTH, Some(0)).unwrap()
    }
    pub fn is_signed(&self) -> bool {
        self._tab.get::<bool>(Self::VT_IS_SIGNED, Some(false)).unwrap()
    }
}

fb_table!(FloatingPoint);
impl<'a> FloatingPoint<'a> {
    pub const VT_PRECISION: u16 = 4;

    pub fn precision(&self) -> Precision {
        self._tab
            .get::<Precision>(Self::VT_PRECISION, Some(Precision::HALF))
            .unwrap()
    }
}

fb_table!(Decimal);
impl<'a> Decimal<'a> {
    pub const VT_PRECISION: u16 = 4;
    pub const VT_SCALE: u16 = 6;
    pub const VT_BIT_WIDTH: u16 = 8;

    pub fn precision(&self) -> i32 {
        self._tab.get::<i32>(Self::VT_PRECISION, Some(0)).unwrap()
    }
    pub fn scale(&self) -> i32 {
        self._tab.get::<i32>(Self::VT_SCALE, Some(0)).unwrap()
    }
    pub fn bit_width(&self) -> i32 {
        self._tab
            .get::<i32>(Self::VT_BIT_WIDTH, Some(DECIMAL_DEFAULT_BIT_WIDTH))
            .unwrap()
    }
}

fb_table!(Date);
impl<'a> Date<'a> {
    pub const VT_UNIT: u16 = 4;

    pub fn unit(&self) -> DateUnit {
        self._tab
            .get::<DateUnit>(Self::VT_UNIT, Some(DateUnit::MILLISECOND))
            .unwrap()
    }
}

fb_table!(Time);
impl<'a> Time<'a> {
    pub const VT_UNIT: u16 = 4;
    pub const VT_BIT_WIDTH: u16 = 6;

    pub fn unit(&self) -> TimeUnit {
        self._tab
            .get::<TimeUnit>(Self::VT_UNIT, Some(TimeUnit::MILLISECOND))
            .unwrap()
    }
    pub fn bit_width(&self) -> i32 {
        self._tab.get::<i32>(Self::VT_BIT_WIDTH, Some(32)).unwrap()
    }
}

fb_table!(Timestamp);
impl<'a> Timestamp<'a> {
    pub const VT_UNIT: u16 = 4;
    pub const VT_TIMEZONE: u16 = 6;

    pub fn unit(&self) -> TimeUnit {
        self._tab
            .get::<TimeUnit>(Self::VT_UNIT, Some(TimeUnit::SECOND))
            .unwrap()
    }
    pub fn timezone(&self) -> Option<&'a str> {
        self._tab
            .get::<flatbuffers::ForwardsUOffset<&'a str>>(Self::VT_TIMEZONE, None)
    }
}

fb_table!(Interval);
impl<'a> Interval<'a> {
    pub const VT_UNIT: u16 = 4;

    pub fn unit(&self) -> IntervalUnit {
        self._tab
            .get::<IntervalUnit>(Self::VT_UNIT, Some(IntervalUnit::YEAR_MONTH))
            .unwrap()
    }
}

fb_table!(Duration);
impl<'a> Duration<'a> {
    pub const VT_UNIT: u16 = 4;

    pub fn unit(&self) -> TimeUnit {
        self._tab
            .get::<TimeUnit>(Self::VT_UNIT, Some(TimeUnit::MILLISECOND))
            .unwrap()
    }
}

fb_table!(FixedSizeBinary);
impl<'a> FixedSizeBinary<'a> {
    pub const VT_BYTE_WIDTH: u16 = 4;

    pub fn byte_width(&self) -> i32 {
        self._tab.get::<i32>(Self::VT_BYTE_WIDTH, Some(0)).unwrap()
    }
}

fb_table!(FixedSizeList);
impl<'a> FixedSizeList<'a> {
    pub const VT_LIST_SIZE: u16 = 4;

    pub fn list_size(&self) -> i32 {
        self._tab.get::<i32>(Self::VT_LIST_SIZE, Some(0)).unwrap()
    }
}

fb_table!(Map);
impl<'a> Map<'a> {
    pub const VT_KEYS_SORTED: u16 = 4;

    pub fn keys_sorted(&self) -> bool {
        self._tab
            .get::<bool>(Self::VT_KEYS_SORTED, Some(false))
            .unwrap()
    }
}

fb_table!(Union);
impl<'a> Union<'a> {
    pub const VT_MODE: u16 = 4;
    pub const VT_TYPE_IDS: u16 = 6;

    pub fn mode(&self) -> UnionMode {
        self._tab
            .get::<UnionMode>(Self::VT_MODE, Some(UnionMode::Sparse))
            .unwrap()
    }
    pub fn type_ids(&self) -> Option<flatbuffers::Vector<'a, i32>> {
        self._tab
            .get::<flatbuffers::ForwardsUOffset<flatbuffers::Vector<'a, i32>>>(
                Self::VT_TYPE_IDS,
                None,
            )
    }
}

fb_table!(KeyValue);
impl<'a> KeyValue<'a> {
    pub const VT_KEY: u16 = 4;
    pub const VT_VALUE: u16 = 6;

    pub fn key(&self) -> Option<&'a str> {
        self._tab
            .get::<flatbuffers::ForwardsUOffset<&'a str>>(Self::VT_KEY, None)
    }
    pub fn value(&self) -> Option<&'a str> {
        self._tab
            .get::<flatbuffers::ForwardsUOffset<&'a str>>(Self::VT_VALUE, None)
    }
}

fb_table!(Field);
impl<'a> Field<'a> {
    pub const VT_NAME: u16 = 4;
    pub const VT_NULLABLE: u16 = 6;
    pub const VT_TYPE_TYPE: u16 = 8;
    pub const VT_TYPE: u16 = 10;
    // A `dictionary: DictionaryEncoding` slot sits between `type_` and
    // `children` in the published `Field` table; this crate never writes one
    // (dictionary encoding is a declared non-goal) but the slot still shifts
    // every offset after it, so it must be accounted for here.
    pub const VT_DICTIONARY: u16 = 12;
    pub const VT_CHILDREN: u16 = 14;
    pub const VT_CUSTOM_METADATA: u16 = 16;

    pub fn name(&self) -> Option<&'a str> {
        self._tab
            .get::<flatbuffers::ForwardsUOffset<&'a str>>(Self::VT_NAME, None)
    }
    pub fn nullable(&self) -> bool {
        self._tab.get::<bool>(Self::VT_NULLABLE, Some(false)).unwrap()
    }
    pub fn type_type(&self) -> Type {
        self._tab.get::<Type>(Self::VT_TYPE_TYPE, Some(Type::NONE)).unwrap()
    }
    pub(crate) fn type_table(&self) -> Option<Table<'a>> {
        self._tab
            .get::<flatbuffers::ForwardsUOffset<Table<'a>>>(Self::VT_TYPE, None)
    }
    /// Always absent: this crate neither reads nor writes dictionary-encoded
    /// fields (a declared non-goal), so there is no corresponding struct to
    /// decode here. Exposed only so the vtable slot isn't orphaned.
    pub fn dictionary(&self) -> Option<Table<'a>> {
        self._tab
            .get::<flatbuffers::ForwardsUOffset<Table<'a>>>(Self::VT_DICTIONARY, None)
    }
    pub fn children(&self) -> Option<flatbuffers::Vector<'a, flatbuffers::ForwardsUOffset<Field<'a>>>> {
        self._tab.get::<flatbuffers::ForwardsUOffset<
            flatbuffers::Vector<'a, flatbuffers::ForwardsUOffset<Field<'a>>>,
        >>(Self::VT_CHILDREN, None)
    }
    pub fn custom_metadata(
        &self,
    ) -> Option<flatbuffers::Vector<'a, flatbuffers::ForwardsUOffset<KeyValue<'a>>>> {
        self._tab.get::<flatbuffers::ForwardsUOffset<
            flatbuffers::Vector<'a, flatbuffers::ForwardsUOffset<KeyValue<'a>>>,
        >>(Self::VT_CUSTOM_METADATA, None)
    }
}

fb_table!(Schema);
impl<'a> Schema<'a> {
    pub const VT_ENDIANNESS: u16 = 4;
    pub const VT_FIELDS: u16 = 6;
    pub const VT_CUSTOM_METADATA: u16 = 8;

    pub fn endianness(&self) -> Endianness {
        self._tab
            .get::<Endianness>(Self::VT_ENDIANNESS, Some(Endianness::Little))
            .unwrap()
    }
    pub fn fields(&self) -> Option<flatbuffers::Vector<'a, flatbuffers::ForwardsUOffset<Field<'a>>>> {
        self._tab.get::<flatbuffers::ForwardsUOffset<
            flatbuffers::Vector<'a, flatbuffers::ForwardsUOffset<Field<'a>>>,
        >>(Self::VT_FIELDS, None)
    }
    pub fn custom_metadata(
        &self,
    ) -> Option<flatbuffers::Vector<'a, flatbuffers::ForwardsUOffset<KeyValue<'a>>>> {
        self._tab.get::<flatbuffers::ForwardsUOffset<
            flatbuffers::Vector<'a, flatbuffers::ForwardsUOffset<KeyValue<'a>>>,
        >>(Self::VT_CUSTOM_METADATA, None)
    }
}

fb_table!(BodyCompression);
impl<'a> BodyCompression<'a> {
    pub const VT_CODEC: u16 = 4;
    pub const VT_METHOD: u16 = 6;

    pub fn codec(&self) -> CompressionType {
        self._tab
            .get::<CompressionType>(Self::VT_CODEC, Some(CompressionType::Lz4Frame))
            .unwrap()
    }
    pub fn method(&self) -> BodyCompressionMethod {
        self._tab
            .get::<BodyCompressionMethod>(Self::VT_METHOD, Some(BodyCompressionMethod::Buffer))
            .unwrap()
    }
}

fb_table!(RecordBatch);
impl<'a> RecordBatch<'a> {
    pub const VT_LENGTH: u16 = 4;
    pub const VT_NODES: u16 = 6;
    pub const VT_BUFFERS: u16 = 8;
    pub const VT_COMPRESSION: u16 = 10;

    pub fn length(&self) -> i64 {
        self._tab.get::<i64>(Self::VT_LENGTH, Some(0)).unwrap()
    }
    pub fn nodes(&self) -> Option<flatbuffers::Vector<'a, FieldNode>> {
        self._tab
            .get::<flatbuffers::ForwardsUOffset<flatbuffers::Vector<'a, FieldNode>>>(
                Self::VT_NODES,
                None,
            )
    }
    pub fn buffers(&self) -> Option<flatbuffers::Vector<'a, Buffer>> {
        self._tab
            .get::<flatbuffers::ForwardsUOffset<flatbuffers::Vector<'a, Buffer>>>(
                Self::VT_BUFFERS,
                None,
            )
    }
    pub fn compression(&self) -> Option<BodyCompression<'a>> {
        self._tab
            .get::<flatbuffers::ForwardsUOffset<BodyCompression<'a>>>(Self::VT_COMPRESSION, None)
    }
}

fb_table!(DictionaryBatch);

fb_table!(Message);
impl<'a> Message<'a> {
    pub const VT_VERSION: u16 = 4;
    pub const VT_HEADER_TYPE: u16 = 6;
    pub const VT_HEADER: u16 = 8;
    pub const VT_BODY_LENGTH: u16 = 10;
    pub const VT_CUSTOM_METADATA: u16 = 12;

    pub fn version(&self) -> MetadataVersion {
        self._tab
            .get::<MetadataVersion>(Self::VT_VERSION, Some(MetadataVersion::V5))
            .unwrap()
    }
    pub fn header_type(&self) -> MessageHeader {
        self._tab
            .get::<MessageHeader>(Self::VT_HEADER_TYPE, Some(MessageHeader::NONE))
            .unwrap()
    }
    fn header_table(&self) -> Option<Table<'a>> {
        self._tab
            .get::<flatbuffers::ForwardsUOffset<Table<'a>>>(Self::VT_HEADER, None)
    }
    pub fn header_as_schema(&self) -> Option<Schema<'a>> {
        (self.header_type() == MessageHeader::Schema)
            .then(|| self.header_table().map(Schema::init_from_table))
            .flatten()
    }
    pub fn header_as_record_batch(&self) -> Option<RecordBatch<'a>> {
        (self.header_type() == MessageHeader::RecordBatch)
            .then(|| self.header_table().map(RecordBatch::init_from_table))
            .flatten()
    }
    pub fn body_length(&self) -> i64 {
        self._tab.get::<i64>(Self::VT_BODY_LENGTH, Some(0)).unwrap()
    }
}

pub fn root_as_message(buf: &[u8]) -> Result<Message<'_>, flatbuffers::InvalidFlatbuffer> {
    flatbuffers::root::<Message>(buf)
}

fb_table!(Footer);
impl<'a> Footer<'a> {
    pub const VT_VERSION: u16 = 4;
    pub const VT_SCHEMA: u16 = 6;
    pub const VT_DICTIONARIES: u16 = 8;
    pub const VT_RECORD_BATCHES: u16 = 10;
    pub const VT_CUSTOM_METADATA: u16 = 12;

    pub fn version(&self) -> MetadataVersion {
        self._tab
            .get::<MetadataVersion>(Self::VT_VERSION, Some(MetadataVersion::V5))
            .unwrap()
    }
    pub fn schema(&self) -> Option<Schema<'a>> {
        self._tab
            .get::<flatbuffers::ForwardsUOffset<Schema<'a>>>(Self::VT_SCHEMA, None)
    }
    pub fn record_batches(&self) -> Option<flatbuffers::Vector<'a, Block>> {
        self._tab
            .get::<flatbuffers::ForwardsUOffset<flatbuffers::Vector<'a, Block>>>(
                Self::VT_RECORD_BATCHES,
                None,
            )
    }
}

pub fn root_as_footer(buf: &[u8]) -> Result<Footer<'_>, flatbuffers::InvalidFlatbuffer> {
    flatbuffers::root::<Footer>(buf)
}

/// Thin helpers over [`FlatBufferBuilder`]'s table-building primitives, kept
/// here rather than as one `XxxBuilder` struct per table (as `flatc` would
/// emit) since every table this crate writes is built exactly once, in one
/// place, by `crate::format`.
pub(crate) struct TableWriter<'a, 'b> {
    pub(crate) fbb: &'b mut FlatBufferBuilder<'a>,
    start: WIPOffset<()>,
}

impl<'a, 'b> TableWriter<'a, 'b> {
    pub(crate) fn start(fbb: &'b mut FlatBufferBuilder<'a>) -> Self {
        let start = fbb.start_table();
        Self { fbb, start }
    }

    pub(crate) fn push_scalar<T: Push + Copy>(&mut self, vt: u16, value: T, default: T)
    where
        T: PartialEq,
    {
        self.fbb.push_slot::<T>(vt, value, default);
    }

    pub(crate) fn push_offset<T>(&mut self, vt: u16, value: Option<WIPOffset<T>>) {
        if let Some(value) = value {
            self.fbb.push_slot_always(vt, value);
        }
    }

    pub(crate) fn finish<T>(self) -> WIPOffset<T> {
        let end = self.fbb.end_table(self.start);
        WIPOffset::new(end.value())
    }
}
