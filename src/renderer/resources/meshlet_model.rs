use crate::renderer::common::{Format, MemoryAccess, ResourceType};
use crate::renderer::resources::gpu_buffer::{GpuBuffer, GpuBufferDesc};
use crate::renderer::resources::pipeline_state::VertexElementDesc;
use crate::renderer::GraphicsContext;
use bytemuck::{Pod, Zeroable};
use color_eyre::eyre::{bail, eyre, OptionExt};
use color_eyre::Result;
use glam::{Vec3, Vec4};
use std::path::Path;

const PROLOG: u32 = u32::from_be_bytes(*b"MSHL");
const CURRENT_FILE_VERSION: u32 = 0;
const NUM_ATTRIBUTES: usize = 5;
const NO_ATTRIBUTE: u32 = u32::MAX;

const ATTRIBUTES: [(&str, Format); NUM_ATTRIBUTES] = [
    ("POSITION", Format::RGB32_Float),
    ("NORMAL", Format::RGB32_Float),
    ("TEXCOORD", Format::RG32_Float),
    ("TANGENT", Format::RGB32_Float),
    ("BITANGENT", Format::RGB32_Float),
];

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct FileHeader {
    prolog: u32,
    version: u32,
    mesh_count: u32,
    accessor_count: u32,
    buffer_view_count: u32,
    buffer_size: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct MeshHeader {
    indices: u32,
    index_subsets: u32,
    attributes: [u32; NUM_ATTRIBUTES],
    meshlets: u32,
    meshlet_subsets: u32,
    unique_vertex_indices: u32,
    primitive_indices: u32,
    cull_data: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct Accessor {
    buffer_view: u32,
    offset: u32,
    size: u32,
    stride: u32,
    count: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct BufferView {
    offset: u32,
    size: u32,
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct Subset {
    pub offset: u32,
    pub count: u32,
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct Meshlet {
    pub vert_count: u32,
    pub vert_offset: u32,
    pub prim_count: u32,
    pub prim_offset: u32,
}

/// Three 10-bit local vertex indices
#[repr(transparent)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct PackedTriangle(pub u32);

impl PackedTriangle {
    pub fn new(i0: u32, i1: u32, i2: u32) -> Self {
        Self((i0 & 0x3FF) | (i1 & 0x3FF) << 10 | (i2 & 0x3FF) << 20)
    }

    pub fn indices(self) -> [u32; 3] {
        [self.0 & 0x3FF, (self.0 >> 10) & 0x3FF, (self.0 >> 20) & 0x3FF]
    }
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct CullData {
    /// xyz = center, w = radius
    pub bounding_sphere: [f32; 4],
    /// xyz = axis, w = -cos(a + 90)
    pub normal_cone: [u8; 4],
    /// apex = center - axis * offset
    pub apex_offset: f32,
}

/// Constants the meshlet shaders read per mesh
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct MeshInfo {
    pub index_size: u32,
    pub meshlet_count: u32,
    pub last_meshlet_vert_count: u32,
    pub last_meshlet_prim_count: u32,
}

#[derive(Debug, Default, Clone)]
pub struct MeshletMesh {
    pub layout_elems: Vec<VertexElementDesc>,
    pub vertex_strides: Vec<u32>,
    pub vertices: Vec<Vec<u8>>,
    pub vertex_count: u32,

    pub index_size: u32,
    pub index_count: u32,
    pub indices: Vec<u8>,
    pub index_subsets: Vec<Subset>,

    pub meshlets: Vec<Meshlet>,
    pub meshlet_subsets: Vec<Subset>,
    pub unique_vertex_indices: Vec<u8>,
    pub primitive_indices: Vec<PackedTriangle>,
    pub cull_data: Vec<CullData>,

    /// xyz = center, w = radius
    pub bounding_sphere: Vec4,
}

impl MeshletMesh {
    pub fn mesh_info(&self) -> MeshInfo {
        let last = self.meshlets.last().copied().unwrap_or_default();
        MeshInfo {
            index_size: self.index_size,
            meshlet_count: self.meshlets.len() as u32,
            last_meshlet_vert_count: last.vert_count,
            last_meshlet_prim_count: last.prim_count,
        }
    }
}

/// GPU copies of one mesh
#[derive(Debug)]
pub struct MeshletMeshResources {
    pub vertex_buffers: Vec<GpuBuffer>,
    pub index_buffer: GpuBuffer,
    pub meshlet_buffer: GpuBuffer,
    pub unique_vertex_index_buffer: GpuBuffer,
    pub primitive_index_buffer: GpuBuffer,
    pub cull_data_buffer: GpuBuffer,
    pub mesh_info_buffer: GpuBuffer,
}

/// Meshlet model read from the `MSHL` binary container
#[derive(Debug, Default, Clone)]
pub struct MeshletModel {
    pub meshes: Vec<MeshletMesh>,
    pub bounding_sphere: Vec4,
}

struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .offset
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| eyre!("meshlet file truncated at byte {}", self.offset))?;
        let slice = &self.bytes[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    fn read<T: Pod>(&mut self) -> Result<T> {
        Ok(bytemuck::pod_read_unaligned(self.take(size_of::<T>())?))
    }

    fn read_array<T: Pod>(&mut self, count: usize) -> Result<Vec<T>> {
        let bytes = self.take(count * size_of::<T>())?;
        Ok(cast_vec(bytes))
    }
}

fn cast_vec<T: Pod>(bytes: &[u8]) -> Vec<T> {
    bytes
        .chunks_exact(size_of::<T>())
        .map(bytemuck::pod_read_unaligned)
        .collect()
}

struct Container<'a> {
    accessors: Vec<Accessor>,
    views: Vec<BufferView>,
    data: &'a [u8],
}

impl Container<'_> {
    fn accessor(&self, index: u32) -> Result<&Accessor> {
        self.accessors
            .get(index as usize)
            .ok_or_else(|| eyre!("accessor {index} out of range ({} accessors)", self.accessors.len()))
    }

    fn view(&self, accessor: &Accessor) -> Result<&[u8]> {
        let view = self.views.get(accessor.buffer_view as usize).ok_or_else(|| {
            eyre!("buffer view {} out of range ({} views)", accessor.buffer_view, self.views.len())
        })?;
        let start = view.offset as usize;
        let end = start + view.size as usize;
        self.data
            .get(start..end)
            .ok_or_else(|| eyre!("buffer view {}..{end} exceeds the data blob", start))
    }

    /// The accessor's elements, `count` of them, read from its view
    fn elements<T: Pod>(&self, index: u32) -> Result<Vec<T>> {
        let accessor = self.accessor(index)?;
        let bytes = self.view(accessor)?;
        let len = accessor.count as usize * size_of::<T>();
        let bytes = bytes
            .get(accessor.offset as usize..accessor.offset as usize + len)
            .ok_or_else(|| eyre!("accessor {index} reads past its buffer view"))?;
        Ok(cast_vec(bytes))
    }
}

impl MeshletModel {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| eyre!("failed to read {}: {e}", path.display()))?;
        let model = Self::from_bytes(&bytes).map_err(|e| eyre!("{}: {e}", path.display()))?;
        log::info!("Loaded meshlet model {} ({} meshes)", path.display(), model.meshes.len());
        Ok(model)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader { bytes, offset: 0 };
        let header: FileHeader = reader.read()?;

        if header.prolog != PROLOG {
            bail!("not a meshlet file (prolog {:#010x})", header.prolog);
        }
        if header.version != CURRENT_FILE_VERSION {
            bail!("unsupported meshlet file version {}", header.version);
        }

        let mesh_headers: Vec<MeshHeader> = reader.read_array(header.mesh_count as usize)?;
        let accessors = reader.read_array(header.accessor_count as usize)?;
        let views = reader.read_array(header.buffer_view_count as usize)?;
        let data = reader.take(header.buffer_size as usize)?;
        let container = Container { accessors, views, data };

        let mut meshes = Vec::with_capacity(mesh_headers.len());
        for mesh_header in &mesh_headers {
            meshes.push(Self::read_mesh(&container, mesh_header)?);
        }

        let bounding_sphere = meshes
            .iter()
            .map(|m| m.bounding_sphere)
            .reduce(merge_spheres)
            .unwrap_or(Vec4::ZERO);

        Ok(Self { meshes, bounding_sphere })
    }

    fn read_mesh(container: &Container, header: &MeshHeader) -> Result<MeshletMesh> {
        let mut mesh = MeshletMesh::default();

        let index_accessor = container.accessor(header.indices)?;
        mesh.index_size = index_accessor.size;
        mesh.index_count = index_accessor.count;
        mesh.indices = container.view(index_accessor)?.to_vec();
        mesh.index_subsets = container.elements(header.index_subsets)?;

        // One stream per distinct buffer view
        let mut stream_views: Vec<u32> = Vec::new();
        for (attribute, (semantic, format)) in header.attributes.iter().zip(ATTRIBUTES) {
            if *attribute == NO_ATTRIBUTE {
                continue;
            }
            let accessor = container.accessor(*attribute)?;
            if accessor.stride == 0 {
                bail!("vertex attribute {semantic} has zero stride");
            }

            let input_slot = match stream_views.iter().position(|v| *v == accessor.buffer_view) {
                Some(slot) => slot,
                None => {
                    let verts = container.view(accessor)?;
                    stream_views.push(accessor.buffer_view);
                    mesh.vertex_strides.push(accessor.stride);
                    mesh.vertex_count = verts.len() as u32 / accessor.stride;
                    mesh.vertices.push(verts.to_vec());
                    stream_views.len() - 1
                }
            };

            mesh.layout_elems.push(VertexElementDesc::per_vertex(
                semantic,
                format,
                input_slot as u32,
                accessor.offset,
            ));
        }

        mesh.meshlets = container.elements(header.meshlets)?;
        mesh.meshlet_subsets = container.elements(header.meshlet_subsets)?;
        mesh.unique_vertex_indices = container.view(container.accessor(header.unique_vertex_indices)?)?.to_vec();
        mesh.primitive_indices = container.elements(header.primitive_indices)?;
        mesh.cull_data = container.elements(header.cull_data)?;
        mesh.bounding_sphere = mesh_bounding_sphere(&mesh);

        Ok(mesh)
    }

    pub fn create_gpu_resources(&self, ctx: &GraphicsContext) -> Result<Vec<MeshletMeshResources>> {
        let structured = |name: String, count: usize, size: usize, data: &[u8]| {
            let desc = GpuBufferDesc::new(name, ResourceType::STRUCTURED_BUFFER, count, size)
                .with_initial_data(data);
            GpuBuffer::new(ctx, &desc)
        };

        let mut resources = Vec::with_capacity(self.meshes.len());
        for (i, m) in self.meshes.iter().enumerate() {
            let mut vertex_buffers = Vec::with_capacity(m.vertices.len());
            for (j, (verts, stride)) in m.vertices.iter().zip(&m.vertex_strides).enumerate() {
                let stride = *stride as usize;
                vertex_buffers.push(structured(
                    format!("Mesh {i} - Vertex Resource {j}"),
                    verts.len() / stride,
                    stride,
                    verts,
                )?);
            }

            let index_size = (m.index_size as usize).max(1);
            let index_buffer = structured(
                format!("Mesh {i} - Index Resource"),
                m.indices.len() / index_size,
                index_size,
                &m.indices,
            )?;
            let meshlet_buffer = structured(
                format!("Mesh {i} - Meshlet Resource"),
                m.meshlets.len(),
                size_of::<Meshlet>(),
                bytemuck::cast_slice(&m.meshlets),
            )?;
            let unique_vertex_index_buffer = GpuBuffer::new(
                ctx,
                &GpuBufferDesc::new(
                    format!("Mesh {i} - UniqueVertexIndex Resource"),
                    ResourceType::BYTE_ADDRESS_BUFFER,
                    m.unique_vertex_indices.len(),
                    1,
                )
                .with_initial_data(&m.unique_vertex_indices),
            )?;
            let primitive_index_buffer = structured(
                format!("Mesh {i} - PrimitiveIndex Resource"),
                m.primitive_indices.len(),
                size_of::<PackedTriangle>(),
                bytemuck::cast_slice(&m.primitive_indices),
            )?;
            let cull_data_buffer = structured(
                format!("Mesh {i} - CullData Resource"),
                m.cull_data.len(),
                size_of::<CullData>(),
                bytemuck::cast_slice(&m.cull_data),
            )?;

            let info = m.mesh_info();
            let mesh_info_buffer = GpuBuffer::new(
                ctx,
                &GpuBufferDesc::constant_buffer(format!("Mesh {i} - MeshInfo Resource"), 1, size_of::<MeshInfo>())
                    .with_memory_access(MemoryAccess::CPU_WRITE | MemoryAccess::GPU_READ)
                    .with_initial_data(bytemuck::bytes_of(&info)),
            )?;

            resources.push(MeshletMeshResources {
                vertex_buffers,
                index_buffer,
                meshlet_buffer,
                unique_vertex_index_buffer,
                primitive_index_buffer,
                cull_data_buffer,
                mesh_info_buffer,
            });
        }
        Ok(resources)
    }
}

fn mesh_bounding_sphere(mesh: &MeshletMesh) -> Vec4 {
    let Some(position) = mesh.layout_elems.iter().find(|e| e.semantic_name == "POSITION") else {
        return Vec4::ZERO;
    };
    let slot = position.input_slot as usize;
    let (Some(verts), Some(stride)) = (mesh.vertices.get(slot), mesh.vertex_strides.get(slot)) else {
        return Vec4::ZERO;
    };

    let points: Vec<Vec3> = verts
        .chunks_exact(*stride as usize)
        .filter_map(|vertex| {
            let start = position.aligned_byte_offset as usize;
            let xyz: [f32; 3] = bytemuck::pod_read_unaligned(vertex.get(start..start + 12)?);
            Some(Vec3::from_array(xyz))
        })
        .collect();

    let Some(first) = points.first() else {
        return Vec4::ZERO;
    };
    let (min, max) = points
        .iter()
        .fold((*first, *first), |(min, max), p| (min.min(*p), max.max(*p)));
    let center = (min + max) * 0.5;
    let radius = points.iter().map(|p| p.distance(center)).fold(0.0, f32::max);
    center.extend(radius)
}

fn merge_spheres(a: Vec4, b: Vec4) -> Vec4 {
    let (ca, ra) = (a.truncate(), a.w);
    let (cb, rb) = (b.truncate(), b.w);
    let d = cb.distance(ca);

    if d + rb <= ra {
        return a;
    }
    if d + ra <= rb {
        return b;
    }

    let radius = (ra + rb + d) * 0.5;
    let direction = (cb - ca) / d;
    let center = ca + direction * (radius - ra);
    center.extend(radius)
}

/// Reads a model and fails with the file name when `path` is missing
pub fn load_required(path: impl AsRef<Path>) -> Result<MeshletModel> {
    let path = path.as_ref();
    path.exists()
        .then_some(())
        .ok_or_eyre(format!("meshlet model {} does not exist", path.display()))?;
    MeshletModel::load(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds a one mesh file: a single triangle meshlet with positions and normals interleaved
    fn triangle_file() -> Vec<u8> {
        let mut data: Vec<u8> = Vec::new();
        let mut views: Vec<BufferView> = Vec::new();
        let mut push_view = |data: &mut Vec<u8>, bytes: &[u8]| {
            views.push(BufferView { offset: data.len() as u32, size: bytes.len() as u32 });
            data.extend_from_slice(bytes);
            views.len() as u32 - 1
        };

        let indices: [u16; 3] = [0, 1, 2];
        let index_subsets = [Subset { offset: 0, count: 3 }];
        let vertices: [[f32; 6]; 3] = [
            [0.0, 0.0, 0.0, 0.0, 0.0, 1.0],
            [2.0, 0.0, 0.0, 0.0, 0.0, 1.0],
            [0.0, 2.0, 0.0, 0.0, 0.0, 1.0],
        ];
        let meshlets = [Meshlet { vert_count: 3, vert_offset: 0, prim_count: 1, prim_offset: 0 }];
        let unique: [u8; 3] = [0, 1, 2];
        let prims = [PackedTriangle::new(0, 1, 2)];
        let cull = [CullData { bounding_sphere: [1.0, 1.0, 0.0, 1.5], normal_cone: [0, 0, 255, 0], apex_offset: 0.0 }];

        let v_indices = push_view(&mut data, bytemuck::cast_slice(&indices));
        let v_subsets = push_view(&mut data, bytemuck::cast_slice(&index_subsets));
        let v_verts = push_view(&mut data, bytemuck::cast_slice(&vertices));
        let v_meshlets = push_view(&mut data, bytemuck::cast_slice(&meshlets));
        let v_unique = push_view(&mut data, &unique);
        let v_prims = push_view(&mut data, bytemuck::cast_slice(&prims));
        let v_cull = push_view(&mut data, bytemuck::cast_slice(&cull));

        let accessors = [
            Accessor { buffer_view: v_indices, offset: 0, size: 2, stride: 2, count: 3 },
            Accessor { buffer_view: v_subsets, offset: 0, size: 8, stride: 8, count: 1 },
            Accessor { buffer_view: v_verts, offset: 0, size: 12, stride: 24, count: 3 },
            Accessor { buffer_view: v_verts, offset: 12, size: 12, stride: 24, count: 3 },
            Accessor { buffer_view: v_meshlets, offset: 0, size: 16, stride: 16, count: 1 },
            Accessor { buffer_view: v_subsets, offset: 0, size: 8, stride: 8, count: 1 },
            Accessor { buffer_view: v_unique, offset: 0, size: 1, stride: 1, count: 3 },
            Accessor { buffer_view: v_prims, offset: 0, size: 4, stride: 4, count: 1 },
            Accessor { buffer_view: v_cull, offset: 0, size: 24, stride: 24, count: 1 },
        ];
        let mesh = MeshHeader {
            indices: 0,
            index_subsets: 1,
            attributes: [2, 3, NO_ATTRIBUTE, NO_ATTRIBUTE, NO_ATTRIBUTE],
            meshlets: 4,
            meshlet_subsets: 5,
            unique_vertex_indices: 6,
            primitive_indices: 7,
            cull_data: 8,
        };
        let header = FileHeader {
            prolog: PROLOG,
            version: CURRENT_FILE_VERSION,
            mesh_count: 1,
            accessor_count: accessors.len() as u32,
            buffer_view_count: views.len() as u32,
            buffer_size: data.len() as u32,
        };

        let mut file = Vec::new();
        file.extend_from_slice(bytemuck::bytes_of(&header));
        file.extend_from_slice(bytemuck::bytes_of(&mesh));
        file.extend_from_slice(bytemuck::cast_slice(&accessors));
        file.extend_from_slice(bytemuck::cast_slice(&views));
        file.extend_from_slice(&data);
        file
    }

    #[test]
    fn parses_a_single_mesh() {
        let model = MeshletModel::from_bytes(&triangle_file()).unwrap();
        assert_eq!(model.meshes.len(), 1);

        let mesh = &model.meshes[0];
        assert_eq!(mesh.index_size, 2);
        assert_eq!(mesh.index_count, 3);
        assert_eq!(mesh.indices.len(), 6);
        assert_eq!(mesh.index_subsets, vec![Subset { offset: 0, count: 3 }]);

        // position and normal share one interleaved stream
        assert_eq!(mesh.vertices.len(), 1);
        assert_eq!(mesh.vertex_strides, vec![24]);
        assert_eq!(mesh.vertex_count, 3);
        assert_eq!(mesh.layout_elems.len(), 2);
        assert_eq!(mesh.layout_elems[1].semantic_name, "NORMAL");
        assert_eq!(mesh.layout_elems[1].aligned_byte_offset, 12);
        assert_eq!(mesh.layout_elems[1].input_slot, 0);

        assert_eq!(mesh.meshlets[0].prim_count, 1);
        assert_eq!(mesh.primitive_indices[0].indices(), [0, 1, 2]);
        assert_eq!(mesh.unique_vertex_indices, vec![0, 1, 2]);
        assert_eq!(mesh.cull_data[0].bounding_sphere[3], 1.5);

        let info = mesh.mesh_info();
        assert_eq!((info.meshlet_count, info.last_meshlet_vert_count), (1, 3));

        assert_eq!(mesh.bounding_sphere.truncate(), Vec3::new(1.0, 1.0, 0.0));
        assert!((mesh.bounding_sphere.w - 2f32.sqrt()).abs() < 1e-5);
        assert_eq!(model.bounding_sphere, mesh.bounding_sphere);
    }

    #[test]
    fn rejects_bad_prolog_and_version() {
        let mut bytes = triangle_file();
        bytes[0] ^= 0xFF;
        assert!(MeshletModel::from_bytes(&bytes).unwrap_err().to_string().contains("prolog"));

        let mut bytes = triangle_file();
        bytes[4] = 1;
        assert!(MeshletModel::from_bytes(&bytes).unwrap_err().to_string().contains("version"));
    }

    #[test]
    fn rejects_truncated_files() {
        let bytes = triangle_file();
        assert!(MeshletModel::from_bytes(&bytes[..bytes.len() - 1]).is_err());
        assert!(MeshletModel::from_bytes(&bytes[..10]).is_err());
    }

    #[test]
    fn rejects_out_of_range_accessors() {
        let mut bytes = triangle_file();
        // first field of the mesh header is the index accessor
        let offset = size_of::<FileHeader>();
        bytes[offset..offset + 4].copy_from_slice(&99u32.to_le_bytes());
        assert!(MeshletModel::from_bytes(&bytes).unwrap_err().to_string().contains("accessor 99"));
    }

    #[test]
    fn load_reports_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.bin");
        assert!(load_required(&path).is_err());

        std::fs::write(&path, triangle_file()).unwrap();
        assert_eq!(load_required(&path).unwrap().meshes.len(), 1);
    }
}
