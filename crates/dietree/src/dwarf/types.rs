//! DWARF constant enumerations.
//!
//! Each enum is closed over the values this crate knows about, with an
//! `Unknown` variant carrying anything else so that vendor extensions survive
//! a parse instead of failing it.

use std::fmt;

// `dw_enum!` expands a list of `Variant = value => "DW_..."` lines into the
// enum, `From<repr>`, `value()`, `name()` and a `Display` that prints the
// DWARF name.
macro_rules! dw_enum {
    (
        $(#[$meta:meta])*
        $enum_name:ident($repr:ty) {
            $($variant:ident = $val:literal => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $enum_name {
            $($variant,)+
            /// A value outside the known set.
            Unknown($repr),
        }

        impl From<$repr> for $enum_name {
            fn from(value: $repr) -> Self {
                match value {
                    $($val => Self::$variant,)+
                    other => Self::Unknown(other),
                }
            }
        }

        impl $enum_name {
            /// Every known value, in declaration order.
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// The encoded value.
            pub fn value(self) -> $repr {
                match self {
                    $(Self::$variant => $val,)+
                    Self::Unknown(other) => other,
                }
            }

            /// The DWARF name, or `None` for unknown values.
            pub fn name(self) -> Option<&'static str> {
                match self {
                    $(Self::$variant => Some($text),)+
                    Self::Unknown(_) => None,
                }
            }
        }

        impl fmt::Display for $enum_name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self.name() {
                    Some(name) => f.pad(name),
                    None => write!(f, "Unknown {}: {:#x}", stringify!($enum_name), self.value()),
                }
            }
        }
    };
}

dw_enum!(
    /// Tag of a debugging information entry (`DW_TAG_*`).
    DwTag(u16) {
        ArrayType = 0x01 => "DW_TAG_array_type",
        ClassType = 0x02 => "DW_TAG_class_type",
        EntryPoint = 0x03 => "DW_TAG_entry_point",
        EnumerationType = 0x04 => "DW_TAG_enumeration_type",
        FormalParameter = 0x05 => "DW_TAG_formal_parameter",
        ImportedDeclaration = 0x08 => "DW_TAG_imported_declaration",
        Label = 0x0a => "DW_TAG_label",
        LexicalBlock = 0x0b => "DW_TAG_lexical_block",
        Member = 0x0d => "DW_TAG_member",
        PointerType = 0x0f => "DW_TAG_pointer_type",
        ReferenceType = 0x10 => "DW_TAG_reference_type",
        CompileUnit = 0x11 => "DW_TAG_compile_unit",
        StringType = 0x12 => "DW_TAG_string_type",
        StructureType = 0x13 => "DW_TAG_structure_type",
        SubroutineType = 0x15 => "DW_TAG_subroutine_type",
        Typedef = 0x16 => "DW_TAG_typedef",
        UnionType = 0x17 => "DW_TAG_union_type",
        UnspecifiedParameters = 0x18 => "DW_TAG_unspecified_parameters",
        Variant = 0x19 => "DW_TAG_variant",
        CommonBlock = 0x1a => "DW_TAG_common_block",
        CommonInclusion = 0x1b => "DW_TAG_common_inclusion",
        Inheritance = 0x1c => "DW_TAG_inheritance",
        InlinedSubroutine = 0x1d => "DW_TAG_inlined_subroutine",
        Module = 0x1e => "DW_TAG_module",
        PtrToMemberType = 0x1f => "DW_TAG_ptr_to_member_type",
        SetType = 0x20 => "DW_TAG_set_type",
        SubrangeType = 0x21 => "DW_TAG_subrange_type",
        WithStmt = 0x22 => "DW_TAG_with_stmt",
        AccessDeclaration = 0x23 => "DW_TAG_access_declaration",
        BaseType = 0x24 => "DW_TAG_base_type",
        CatchBlock = 0x25 => "DW_TAG_catch_block",
        ConstType = 0x26 => "DW_TAG_const_type",
        Constant = 0x27 => "DW_TAG_constant",
        Enumerator = 0x28 => "DW_TAG_enumerator",
        FileType = 0x29 => "DW_TAG_file_type",
        Friend = 0x2a => "DW_TAG_friend",
        Namelist = 0x2b => "DW_TAG_namelist",
        NamelistItem = 0x2c => "DW_TAG_namelist_item",
        PackedType = 0x2d => "DW_TAG_packed_type",
        Subprogram = 0x2e => "DW_TAG_subprogram",
        TemplateTypeParameter = 0x2f => "DW_TAG_template_type_parameter",
        TemplateValueParameter = 0x30 => "DW_TAG_template_value_parameter",
        ThrownType = 0x31 => "DW_TAG_thrown_type",
        TryBlock = 0x32 => "DW_TAG_try_block",
        VariantPart = 0x33 => "DW_TAG_variant_part",
        Variable = 0x34 => "DW_TAG_variable",
        VolatileType = 0x35 => "DW_TAG_volatile_type",
        DwarfProcedure = 0x36 => "DW_TAG_dwarf_procedure",
        RestrictType = 0x37 => "DW_TAG_restrict_type",
        InterfaceType = 0x38 => "DW_TAG_interface_type",
        Namespace = 0x39 => "DW_TAG_namespace",
        ImportedModule = 0x3a => "DW_TAG_imported_module",
        UnspecifiedType = 0x3b => "DW_TAG_unspecified_type",
        PartialUnit = 0x3c => "DW_TAG_partial_unit",
        ImportedUnit = 0x3d => "DW_TAG_imported_unit",
        Condition = 0x3f => "DW_TAG_condition",
        SharedType = 0x40 => "DW_TAG_shared_type",
        TypeUnit = 0x41 => "DW_TAG_type_unit",
        RvalueReferenceType = 0x42 => "DW_TAG_rvalue_reference_type",
        TemplateAlias = 0x43 => "DW_TAG_template_alias",
        CoarrayType = 0x44 => "DW_TAG_coarray_type",
        GenericSubrange = 0x45 => "DW_TAG_generic_subrange",
        DynamicType = 0x46 => "DW_TAG_dynamic_type",
        AtomicType = 0x47 => "DW_TAG_atomic_type",
        CallSite = 0x48 => "DW_TAG_call_site",
        CallSiteParameter = 0x49 => "DW_TAG_call_site_parameter",
        SkeletonUnit = 0x4a => "DW_TAG_skeleton_unit",
        ImmutableType = 0x4b => "DW_TAG_immutable_type",
        GnuTemplateParameterPack = 0x4106 => "DW_TAG_GNU_template_parameter_pack",
        GnuFormalParameterPack = 0x4107 => "DW_TAG_GNU_formal_parameter_pack",
        GnuCallSite = 0x4109 => "DW_TAG_GNU_call_site",
        GnuCallSiteParameter = 0x410a => "DW_TAG_GNU_call_site_parameter",
    }
);

dw_enum!(
    /// Attribute name (`DW_AT_*`).
    DwAt(u16) {
        Sibling = 0x01 => "DW_AT_sibling",
        Location = 0x02 => "DW_AT_location",
        Name = 0x03 => "DW_AT_name",
        Ordering = 0x09 => "DW_AT_ordering",
        ByteSize = 0x0b => "DW_AT_byte_size",
        BitOffset = 0x0c => "DW_AT_bit_offset",
        BitSize = 0x0d => "DW_AT_bit_size",
        StmtList = 0x10 => "DW_AT_stmt_list",
        LowPc = 0x11 => "DW_AT_low_pc",
        HighPc = 0x12 => "DW_AT_high_pc",
        Language = 0x13 => "DW_AT_language",
        Discr = 0x15 => "DW_AT_discr",
        DiscrValue = 0x16 => "DW_AT_discr_value",
        Visibility = 0x17 => "DW_AT_visibility",
        Import = 0x18 => "DW_AT_import",
        StringLength = 0x19 => "DW_AT_string_length",
        CommonReference = 0x1a => "DW_AT_common_reference",
        CompDir = 0x1b => "DW_AT_comp_dir",
        ConstValue = 0x1c => "DW_AT_const_value",
        ContainingType = 0x1d => "DW_AT_containing_type",
        DefaultValue = 0x1e => "DW_AT_default_value",
        Inline = 0x20 => "DW_AT_inline",
        IsOptional = 0x21 => "DW_AT_is_optional",
        LowerBound = 0x22 => "DW_AT_lower_bound",
        Producer = 0x25 => "DW_AT_producer",
        Prototyped = 0x27 => "DW_AT_prototyped",
        ReturnAddr = 0x2a => "DW_AT_return_addr",
        StartScope = 0x2c => "DW_AT_start_scope",
        BitStride = 0x2e => "DW_AT_bit_stride",
        UpperBound = 0x2f => "DW_AT_upper_bound",
        AbstractOrigin = 0x31 => "DW_AT_abstract_origin",
        Accessibility = 0x32 => "DW_AT_accessibility",
        AddressClass = 0x33 => "DW_AT_address_class",
        Artificial = 0x34 => "DW_AT_artificial",
        BaseTypes = 0x35 => "DW_AT_base_types",
        CallingConvention = 0x36 => "DW_AT_calling_convention",
        Count = 0x37 => "DW_AT_count",
        DataMemberLocation = 0x38 => "DW_AT_data_member_location",
        DeclColumn = 0x39 => "DW_AT_decl_column",
        DeclFile = 0x3a => "DW_AT_decl_file",
        DeclLine = 0x3b => "DW_AT_decl_line",
        Declaration = 0x3c => "DW_AT_declaration",
        DiscrList = 0x3d => "DW_AT_discr_list",
        Encoding = 0x3e => "DW_AT_encoding",
        External = 0x3f => "DW_AT_external",
        FrameBase = 0x40 => "DW_AT_frame_base",
        Friend = 0x41 => "DW_AT_friend",
        IdentifierCase = 0x42 => "DW_AT_identifier_case",
        MacroInfo = 0x43 => "DW_AT_macro_info",
        NamelistItem = 0x44 => "DW_AT_namelist_item",
        Priority = 0x45 => "DW_AT_priority",
        Segment = 0x46 => "DW_AT_segment",
        Specification = 0x47 => "DW_AT_specification",
        StaticLink = 0x48 => "DW_AT_static_link",
        Type = 0x49 => "DW_AT_type",
        UseLocation = 0x4a => "DW_AT_use_location",
        VariableParameter = 0x4b => "DW_AT_variable_parameter",
        Virtuality = 0x4c => "DW_AT_virtuality",
        VtableElemLocation = 0x4d => "DW_AT_vtable_elem_location",
        Allocated = 0x4e => "DW_AT_allocated",
        Associated = 0x4f => "DW_AT_associated",
        DataLocation = 0x50 => "DW_AT_data_location",
        ByteStride = 0x51 => "DW_AT_byte_stride",
        EntryPc = 0x52 => "DW_AT_entry_pc",
        UseUtf8 = 0x53 => "DW_AT_use_UTF8",
        Extension = 0x54 => "DW_AT_extension",
        Ranges = 0x55 => "DW_AT_ranges",
        Trampoline = 0x56 => "DW_AT_trampoline",
        CallColumn = 0x57 => "DW_AT_call_column",
        CallFile = 0x58 => "DW_AT_call_file",
        CallLine = 0x59 => "DW_AT_call_line",
        Description = 0x5a => "DW_AT_description",
        BinaryScale = 0x5b => "DW_AT_binary_scale",
        DecimalScale = 0x5c => "DW_AT_decimal_scale",
        Small = 0x5d => "DW_AT_small",
        DecimalSign = 0x5e => "DW_AT_decimal_sign",
        DigitCount = 0x5f => "DW_AT_digit_count",
        PictureString = 0x60 => "DW_AT_picture_string",
        Mutable = 0x61 => "DW_AT_mutable",
        ThreadsScaled = 0x62 => "DW_AT_threads_scaled",
        Explicit = 0x63 => "DW_AT_explicit",
        ObjectPointer = 0x64 => "DW_AT_object_pointer",
        Endianity = 0x65 => "DW_AT_endianity",
        Elemental = 0x66 => "DW_AT_elemental",
        Pure = 0x67 => "DW_AT_pure",
        Recursive = 0x68 => "DW_AT_recursive",
        Signature = 0x69 => "DW_AT_signature",
        MainSubprogram = 0x6a => "DW_AT_main_subprogram",
        DataBitOffset = 0x6b => "DW_AT_data_bit_offset",
        ConstExpr = 0x6c => "DW_AT_const_expr",
        EnumClass = 0x6d => "DW_AT_enum_class",
        LinkageName = 0x6e => "DW_AT_linkage_name",
        StringLengthBitSize = 0x6f => "DW_AT_string_length_bit_size",
        StringLengthByteSize = 0x70 => "DW_AT_string_length_byte_size",
        Rank = 0x71 => "DW_AT_rank",
        StrOffsetsBase = 0x72 => "DW_AT_str_offsets_base",
        AddrBase = 0x73 => "DW_AT_addr_base",
        RnglistsBase = 0x74 => "DW_AT_rnglists_base",
        DwoName = 0x76 => "DW_AT_dwo_name",
        Reference = 0x77 => "DW_AT_reference",
        RvalueReference = 0x78 => "DW_AT_rvalue_reference",
        Macros = 0x79 => "DW_AT_macros",
        CallAllCalls = 0x7a => "DW_AT_call_all_calls",
        CallAllSourceCalls = 0x7b => "DW_AT_call_all_source_calls",
        CallAllTailCalls = 0x7c => "DW_AT_call_all_tail_calls",
        CallReturnPc = 0x7d => "DW_AT_call_return_pc",
        CallValue = 0x7e => "DW_AT_call_value",
        CallOrigin = 0x7f => "DW_AT_call_origin",
        CallParameter = 0x80 => "DW_AT_call_parameter",
        CallPc = 0x81 => "DW_AT_call_pc",
        CallTailCall = 0x82 => "DW_AT_call_tail_call",
        CallTarget = 0x83 => "DW_AT_call_target",
        CallTargetClobbered = 0x84 => "DW_AT_call_target_clobbered",
        CallDataLocation = 0x85 => "DW_AT_call_data_location",
        CallDataValue = 0x86 => "DW_AT_call_data_value",
        Noreturn = 0x87 => "DW_AT_noreturn",
        Alignment = 0x88 => "DW_AT_alignment",
        ExportSymbols = 0x89 => "DW_AT_export_symbols",
        Deleted = 0x8a => "DW_AT_deleted",
        Defaulted = 0x8b => "DW_AT_defaulted",
        LoclistsBase = 0x8c => "DW_AT_loclists_base",
        MipsLinkageName = 0x2007 => "DW_AT_MIPS_linkage_name",
        GnuAllTailCallSites = 0x2116 => "DW_AT_GNU_all_tail_call_sites",
        GnuAllCallSites = 0x2117 => "DW_AT_GNU_all_call_sites",
        GnuMacros = 0x2119 => "DW_AT_GNU_macros",
        GnuDwoName = 0x2130 => "DW_AT_GNU_dwo_name",
        GnuDwoId = 0x2131 => "DW_AT_GNU_dwo_id",
        GnuAddrBase = 0x2133 => "DW_AT_GNU_addr_base",
        GnuPubnames = 0x2134 => "DW_AT_GNU_pubnames",
        GnuPubtypes = 0x2135 => "DW_AT_GNU_pubtypes",
        GnuLocviews = 0x2137 => "DW_AT_GNU_locviews",
        GnuEntryView = 0x2138 => "DW_AT_GNU_entry_view",
    }
);

dw_enum!(
    /// Attribute encoding form (`DW_FORM_*`).
    DwForm(u16) {
        Addr = 0x01 => "DW_FORM_addr",
        Block2 = 0x03 => "DW_FORM_block2",
        Block4 = 0x04 => "DW_FORM_block4",
        Data2 = 0x05 => "DW_FORM_data2",
        Data4 = 0x06 => "DW_FORM_data4",
        Data8 = 0x07 => "DW_FORM_data8",
        String = 0x08 => "DW_FORM_string",
        Block = 0x09 => "DW_FORM_block",
        Block1 = 0x0a => "DW_FORM_block1",
        Data1 = 0x0b => "DW_FORM_data1",
        Flag = 0x0c => "DW_FORM_flag",
        Sdata = 0x0d => "DW_FORM_sdata",
        Strp = 0x0e => "DW_FORM_strp",
        Udata = 0x0f => "DW_FORM_udata",
        RefAddr = 0x10 => "DW_FORM_ref_addr",
        Ref1 = 0x11 => "DW_FORM_ref1",
        Ref2 = 0x12 => "DW_FORM_ref2",
        Ref4 = 0x13 => "DW_FORM_ref4",
        Ref8 = 0x14 => "DW_FORM_ref8",
        RefUdata = 0x15 => "DW_FORM_ref_udata",
        Indirect = 0x16 => "DW_FORM_indirect",
        SecOffset = 0x17 => "DW_FORM_sec_offset",
        Exprloc = 0x18 => "DW_FORM_exprloc",
        FlagPresent = 0x19 => "DW_FORM_flag_present",
        Strx = 0x1a => "DW_FORM_strx",
        Addrx = 0x1b => "DW_FORM_addrx",
        RefSup4 = 0x1c => "DW_FORM_ref_sup4",
        StrpSup = 0x1d => "DW_FORM_strp_sup",
        Data16 = 0x1e => "DW_FORM_data16",
        LineStrp = 0x1f => "DW_FORM_line_strp",
        RefSig8 = 0x20 => "DW_FORM_ref_sig8",
        ImplicitConst = 0x21 => "DW_FORM_implicit_const",
        Loclistx = 0x22 => "DW_FORM_loclistx",
        Rnglistx = 0x23 => "DW_FORM_rnglistx",
        RefSup8 = 0x24 => "DW_FORM_ref_sup8",
        Strx1 = 0x25 => "DW_FORM_strx1",
        Strx2 = 0x26 => "DW_FORM_strx2",
        Strx3 = 0x27 => "DW_FORM_strx3",
        Strx4 = 0x28 => "DW_FORM_strx4",
        Addrx1 = 0x29 => "DW_FORM_addrx1",
        Addrx2 = 0x2a => "DW_FORM_addrx2",
        Addrx3 = 0x2b => "DW_FORM_addrx3",
        Addrx4 = 0x2c => "DW_FORM_addrx4",
        GnuAddrIndex = 0x1f01 => "DW_FORM_GNU_addr_index",
        GnuStrIndex = 0x1f02 => "DW_FORM_GNU_str_index",
        GnuRefAlt = 0x1f20 => "DW_FORM_GNU_ref_alt",
        GnuStrpAlt = 0x1f21 => "DW_FORM_GNU_strp_alt",
    }
);

dw_enum!(
    /// Unit type of a version 5 unit header (`DW_UT_*`).
    DwUt(u8) {
        Compile = 0x01 => "DW_UT_compile",
        Type = 0x02 => "DW_UT_type",
        Partial = 0x03 => "DW_UT_partial",
        Skeleton = 0x04 => "DW_UT_skeleton",
        SplitCompile = 0x05 => "DW_UT_split_compile",
        SplitType = 0x06 => "DW_UT_split_type",
    }
);

impl DwForm {
    /// Whether the form belongs to the reference class.
    pub fn is_reference(self) -> bool {
        matches!(
            self,
            DwForm::Ref1
                | DwForm::Ref2
                | DwForm::Ref4
                | DwForm::Ref8
                | DwForm::RefUdata
                | DwForm::RefAddr
                | DwForm::RefSig8
                | DwForm::RefSup4
                | DwForm::RefSup8
                | DwForm::GnuRefAlt
        )
    }
}
