// SPDX-License-Identifier: CEPL-1.0
use crate::ubo::Mvp;
use ash::vk;

pub const UNIFORM_BINDING: u32 = 0;
pub const ALBEDO_BINDING: u32 = 1;

/// Slot of (object `k` in draw order, frame `f`) in both the descriptor set
/// list and the uniform buffer list.
pub fn descriptor_index(object: usize, frame: usize, frames_in_flight: usize) -> usize {
    object * frames_in_flight + frame
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SetBinding {
    pub set: usize,
    pub object: usize,
    pub frame: usize,
}

/// Every descriptor set to write, in set-index order.
pub fn descriptor_plan(objects: usize, frames_in_flight: usize) -> Vec<SetBinding> {
    (0..objects)
        .flat_map(|object| {
            (0..frames_in_flight).map(move |frame| SetBinding {
                set: descriptor_index(object, frame, frames_in_flight),
                object,
                frame,
            })
        })
        .collect()
}

pub(crate) fn layout_bindings() -> [vk::DescriptorSetLayoutBinding<'static>; 2] {
    [
        vk::DescriptorSetLayoutBinding {
            binding: UNIFORM_BINDING,
            descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: 1,
            stage_flags: vk::ShaderStageFlags::VERTEX,
            ..Default::default()
        },
        vk::DescriptorSetLayoutBinding {
            binding: ALBEDO_BINDING,
            descriptor_type: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            descriptor_count: 1,
            stage_flags: vk::ShaderStageFlags::FRAGMENT,
            ..Default::default()
        },
    ]
}

/// Pool sizes for `sets` descriptor sets. Vulkan rejects zero counts, so an
/// empty scene still gets room for one.
pub(crate) fn pool_sizes(sets: usize) -> [vk::DescriptorPoolSize; 2] {
    let n = sets.max(1) as u32;
    [
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: n,
        },
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            descriptor_count: n,
        },
    ]
}

/// Resolved handles for one descriptor set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SetResources {
    pub uniform: vk::Buffer,
    pub view: vk::ImageView,
    pub sampler: vk::Sampler,
}

/// Writes both bindings of every set in one `update_descriptor_sets` call.
///
/// # Safety
/// `sets` and `resources` must be the same length and all handles live.
pub(crate) unsafe fn write_sets(
    device: &ash::Device,
    sets: &[vk::DescriptorSet],
    resources: &[SetResources],
) {
    // Info arrays are filled completely before any write points into them.
    let buffer_infos: Vec<_> = resources
        .iter()
        .map(|r| vk::DescriptorBufferInfo {
            buffer: r.uniform,
            offset: 0,
            range: Mvp::SIZE,
        })
        .collect();
    let image_infos: Vec<_> = resources
        .iter()
        .map(|r| vk::DescriptorImageInfo {
            sampler: r.sampler,
            image_view: r.view,
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        })
        .collect();

    let mut writes = Vec::with_capacity(sets.len() * 2);
    for (i, &set) in sets.iter().enumerate() {
        writes.push(vk::WriteDescriptorSet {
            s_type: vk::StructureType::WRITE_DESCRIPTOR_SET,
            dst_set: set,
            dst_binding: UNIFORM_BINDING,
            descriptor_count: 1,
            descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
            p_buffer_info: &buffer_infos[i],
            ..Default::default()
        });
        writes.push(vk::WriteDescriptorSet {
            s_type: vk::StructureType::WRITE_DESCRIPTOR_SET,
            dst_set: set,
            dst_binding: ALBEDO_BINDING,
            descriptor_count: 1,
            descriptor_type: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            p_image_info: &image_infos[i],
            ..Default::default()
        });
    }
    unsafe { device.update_descriptor_sets(&writes, &[]) };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_matches_index_formula() {
        let plan = descriptor_plan(2, 3);
        assert_eq!(plan.len(), 6);
        for (i, b) in plan.iter().enumerate() {
            assert_eq!(b.set, i);
            assert_eq!(b.set, descriptor_index(b.object, b.frame, 3));
        }
        assert_eq!(plan[4], SetBinding { set: 4, object: 1, frame: 1 });
    }

    #[test]
    fn plan_is_deterministic() {
        assert_eq!(descriptor_plan(5, 2), descriptor_plan(5, 2));
        assert!(descriptor_plan(0, 3).is_empty());
    }

    #[test]
    fn pool_never_sized_zero() {
        assert_eq!(pool_sizes(0)[0].descriptor_count, 1);
        assert_eq!(pool_sizes(6)[1].descriptor_count, 6);
    }
}
